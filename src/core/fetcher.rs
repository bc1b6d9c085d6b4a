use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use actix_rt::Arbiter;
use awc::http::{header, StatusCode};
use futures::StreamExt;
use regex::Regex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::buffer::SegmentWriter;
use crate::core::client::{build_client, ClientSettings};
use crate::core::error::{DownloadError, DownloadResult, SegmentFailure};
use crate::core::planner::ByteRange;
use crate::core::progress::ProgressSlot;
use crate::core::retry::{RetryContext, RetryStrategy};

/// 下载线程参数
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub client: ClientSettings,
    pub read_timeout: Duration,
    pub buffer_size: usize,
    pub retry: RetryStrategy,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: ClientSettings::for_segments(config),
            read_timeout: config.read_timeout(),
            buffer_size: config.buffer_size,
            retry: config.retry_strategy(),
        }
    }
}

/// 一个分段的下载任务，完整移交给下载线程
#[derive(Debug)]
pub struct SegmentTask {
    pub url: String,
    pub range: ByteRange,
    pub total_size: u64,
    pub path: PathBuf,
    pub slot: ProgressSlot,
    pub settings: FetchSettings,
    pub cancel: CancellationToken,
}

/// 下载一个分段到它自己的临时文件
pub async fn fetch_segment(task: SegmentTask) -> DownloadResult<()> {
    let index = task.range.index;
    let client = build_client(&task.settings.client);
    let mut writer = SegmentWriter::create(&task.path, task.settings.buffer_size)
        .map_err(|e| DownloadError::segment(index, SegmentFailure::Disk(e.to_string())))?;
    let mut retry = RetryContext::new(task.settings.retry.clone());

    log::debug!("分段 {} 开始下载: {}-{}", index, task.range.start, task.range.end);

    loop {
        let error = match fetch_attempt(&client, &task, &mut writer).await {
            Ok(()) => {
                log::debug!("分段 {} 下载完成 ({} 字节)", index, writer.total_written());
                return Ok(());
            }
            Err(error) => error,
        };

        // 已收到的数据仍然有效，落盘后重试可以从断点继续
        match writer.flush() {
            Ok(flushed) => task.slot.advance(flushed),
            Err(e) => log::warn!("分段 {} 缓冲区落盘失败: {}", index, e),
        }

        if !retry.should_retry(&error) {
            match error {
                DownloadError::Cancelled => log::debug!("分段 {} 已取消", index),
                _ => log::error!("分段 {} 下载失败: {}", index, error),
            }
            return Err(error);
        }

        let delay = retry.record_retry();
        log::warn!(
            "分段 {} 下载失败: {}，将在 {:?} 后从偏移 {} 重试 (第 {} 次)",
            index,
            error,
            delay,
            writer.total_written(),
            retry.retry_count
        );
        tokio::select! {
            _ = task.cancel.cancelled() => return Err(DownloadError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn fetch_attempt(
    client: &awc::Client,
    task: &SegmentTask,
    writer: &mut SegmentWriter,
) -> DownloadResult<()> {
    let index = task.range.index;
    let fail = |cause: SegmentFailure| DownloadError::segment(index, cause);
    let expected = task.range.size();
    let offset = writer.accepted();

    let request = client
        .get(&task.url)
        .insert_header((header::RANGE, task.range.header_from(offset)))
        .insert_header((header::ACCEPT, "*/*"))
        .insert_header((header::ACCEPT_ENCODING, "identity"))
        .no_decompress();

    let request_timeout = task.settings.client.request_timeout;
    let mut response = tokio::select! {
        biased;
        _ = task.cancel.cancelled() => return Err(DownloadError::Cancelled),
        sent = tokio::time::timeout(request_timeout, request.send()) => match sent {
            Err(_) => return Err(fail(SegmentFailure::Timeout(request_timeout))),
            Ok(sent) => sent.map_err(|e| fail(SegmentFailure::Network(e.to_string())))?,
        },
    };

    match response.status() {
        StatusCode::PARTIAL_CONTENT => {
            if let Some(value) = response.headers().get(header::CONTENT_RANGE) {
                let got = value.to_str().unwrap_or_default();
                let requested = (task.range.start + offset, task.range.end);
                if parse_content_range(got).map(|(start, end, _)| (start, end)) != Some(requested) {
                    return Err(fail(SegmentFailure::RangeMismatch {
                        expected: task.range.header_from(offset),
                        got: got.to_string(),
                    }));
                }
            }
        }
        // 整个资源一次返回，只有单分段且尚未写入任何数据时可以接受
        StatusCode::OK if offset == 0 && task.range.covers_whole(task.total_size) => {}
        status => return Err(fail(SegmentFailure::Status(status.as_u16()))),
    }

    let read_timeout = task.settings.read_timeout;
    loop {
        let next = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = tokio::time::timeout(read_timeout, response.next()) => next,
        };

        let bytes = match next {
            Err(_) => return Err(fail(SegmentFailure::Timeout(read_timeout))),
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(fail(SegmentFailure::Network(e.to_string()))),
            Ok(Some(Ok(bytes))) => bytes,
        };

        let received = writer.accepted() + bytes.len() as u64;
        if received > expected {
            return Err(fail(SegmentFailure::SizeMismatch {
                expected,
                actual: received,
            }));
        }

        let flushed = writer
            .write(&bytes)
            .map_err(|e| fail(SegmentFailure::Disk(e.to_string())))?;
        task.slot.advance(flushed);
    }

    let flushed = writer
        .finish()
        .map_err(|e| fail(SegmentFailure::Disk(e.to_string())))?;
    task.slot.advance(flushed);

    if writer.total_written() != expected {
        return Err(fail(SegmentFailure::SizeMismatch {
            expected,
            actual: writer.total_written(),
        }));
    }
    Ok(())
}

/// 解析 `Content-Range: bytes start-end/total`，total 可能为 `*`
pub fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*bytes\s+(\d+)-(\d+)/(\d+|\*)\s*$").expect("Content-Range 正则无效")
    });

    let captures = pattern.captures(value)?;
    let start = captures[1].parse().ok()?;
    let end = captures[2].parse().ok()?;
    let total = match &captures[3] {
        "*" => None,
        total => Some(total.parse().ok()?),
    };
    Some((start, end, total))
}

/// 下载线程池：每个分段一个 Arbiter（独立线程 + 事件循环）
pub struct FetcherPool {
    arbiters: Vec<Arbiter>,
}

impl FetcherPool {
    pub fn new(size: usize) -> Self {
        Self {
            arbiters: (0..size.max(1)).map(|_| Arbiter::new()).collect(),
        }
    }

    /// 把任务派发到对应线程，结果通过 oneshot 返回；线程丢失时接收端会收到错误
    pub fn dispatch(&self, task: SegmentTask) -> oneshot::Receiver<DownloadResult<()>> {
        let (tx, rx) = oneshot::channel();
        let index = task.range.index;
        let arbiter = &self.arbiters[index % self.arbiters.len()];

        let spawned = arbiter.spawn_fn(move || {
            actix_rt::spawn(async move {
                let result = fetch_segment(task).await;
                let _ = tx.send(result);
            });
        });
        if !spawned {
            log::error!("分段 {} 无法派发到下载线程", index);
        }
        rx
    }

    pub fn shutdown(self) {
        for arbiter in self.arbiters {
            arbiter.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-2499/10000"), Some((0, 2499, Some(10_000))));
        assert_eq!(parse_content_range("bytes 7500-9999/*"), Some((7500, 9999, None)));
        assert_eq!(parse_content_range(" bytes  10-20/30 "), Some((10, 20, Some(30))));
        assert_eq!(parse_content_range("bytes */10000"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range(""), None);
    }

    #[test]
    fn test_fetch_settings_from_config() {
        let mut config = Config::default();
        config.buffer_size = 1024;
        config.retry_count = 2;
        config.read_timeout_secs = 15;

        let settings = FetchSettings::from_config(&config);
        assert_eq!(settings.buffer_size, 1024);
        assert_eq!(settings.read_timeout, Duration::from_secs(15));
        assert_eq!(settings.retry.max_retries, 2);
    }
}
