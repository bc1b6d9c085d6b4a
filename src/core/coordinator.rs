use std::sync::Arc;

use futures::future::join_all;

use crate::core::client::{build_client, ClientSettings};
use crate::core::error::DownloadError;
use crate::core::fetcher::{FetchSettings, FetcherPool, SegmentTask};
use crate::core::job::{DownloadJob, JobContext, JobOutcome, JobPlan, JobState, SegmentOutcomes};
use crate::core::merger::{discard_output, merge_segments};
use crate::core::planner::{effective_workers, plan_ranges};
use crate::core::probe::probe;
use crate::core::progress::ProgressVector;
use crate::core::workspace::TempWorkspace;

/// 驱动一个任务走完 探测 → 分段 → 下载 → 合并
pub struct Coordinator {
    ctx: Arc<JobContext>,
}

impl Coordinator {
    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self { ctx }
    }

    /// 运行到终止状态，结果同时写入共享上下文
    pub async fn run(self) -> JobOutcome {
        let outcome = self.drive().await;
        match &outcome {
            Ok(path) => log::info!("任务 {} 完成: {}", self.ctx.handle.id, path.display()),
            Err(e) => log::error!("任务 {} 失败: {}", self.ctx.handle.id, e),
        }
        self.ctx.finish(outcome.clone());
        outcome
    }

    async fn drive(&self) -> JobOutcome {
        let ctx = &self.ctx;
        let request = &ctx.request;
        let cancel = ctx.cancel_token();
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        ctx.transition(JobState::Probing);
        let client = build_client(&ClientSettings::for_probe(&ctx.config));
        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            info = probe(&client, &request.url, ctx.config.probe_timeout()) => info?,
        };

        ctx.transition(JobState::Planning);
        let workers = effective_workers(info.size, request.workers, info.supports_ranges);
        if !info.supports_ranges && request.workers > 1 {
            log::warn!("服务器不支持 Range 请求，改为单线程下载");
        }
        let ranges = plan_ranges(info.size, workers);
        let plan = ctx.set_plan(JobPlan {
            job: DownloadJob {
                url: request.url.clone(),
                output: request.output.clone(),
                worker_count: ranges.len(),
                total_size: info.size,
                supports_ranges: info.supports_ranges,
            },
            progress: Arc::new(ProgressVector::new(ranges.len())),
            ranges,
        });
        log::info!(
            "开始下载 {} -> {} ({} 字节, {} 个线程)",
            plan.job.url,
            plan.job.output.display(),
            plan.job.total_size,
            plan.job.worker_count
        );

        let workspace = TempWorkspace::prepare(&request.output).map_err(|e| {
            DownloadError::IoError(format!(
                "无法创建临时目录 {}: {}",
                TempWorkspace::dir_for(&request.output).display(),
                e
            ))
        })?;

        ctx.transition(JobState::Fetching);
        let outcomes = self.fetch_all(plan, &workspace).await;
        if cancel.is_cancelled() {
            cleanup(workspace);
            return Err(DownloadError::Cancelled);
        }
        if let Some(error) = outcomes.first_failure() {
            cleanup(workspace);
            return Err(error);
        }

        ctx.transition(JobState::Merging);
        let segments = workspace.segment_paths(plan.ranges.len());
        let output = request.output.clone();
        let total_size = plan.job.total_size;
        let merge_cancel = cancel.clone();
        let merged = tokio::task::spawn_blocking(move || {
            merge_segments(&segments, &output, total_size, &merge_cancel)
        })
        .await
        .unwrap_or_else(|e| Err(DownloadError::MergeFailed(format!("合并线程异常退出: {}", e))));

        let merged = match merged {
            Ok(_) if cancel.is_cancelled() => Err(DownloadError::Cancelled),
            other => other,
        };
        cleanup(workspace);
        if let Err(error) = merged {
            discard_output(&request.output);
            return Err(error);
        }
        Ok(request.output.clone())
    }

    /// 每个分段一个线程，等待全部结束后再判定结果
    async fn fetch_all(&self, plan: &JobPlan, workspace: &TempWorkspace) -> SegmentOutcomes {
        let settings = FetchSettings::from_config(&self.ctx.config);
        let pool = FetcherPool::new(plan.ranges.len());

        let pending: Vec<_> = plan
            .ranges
            .iter()
            .zip(plan.progress.slots())
            .map(|(range, slot)| {
                let index = range.index;
                let receiver = pool.dispatch(SegmentTask {
                    url: plan.job.url.clone(),
                    range: *range,
                    total_size: plan.job.total_size,
                    path: workspace.segment_path(index),
                    slot,
                    settings: settings.clone(),
                    cancel: self.ctx.cancel_token(),
                });
                async move { (index, receiver.await) }
            })
            .collect();

        let mut outcomes = SegmentOutcomes::new(plan.ranges.len());
        for (index, result) in join_all(pending).await {
            match result {
                Ok(result) => outcomes.record(index, result),
                Err(_) => log::error!("分段 {} 的下载线程意外退出", index),
            }
        }
        pool.shutdown();
        outcomes
    }
}

fn cleanup(workspace: TempWorkspace) {
    let path = workspace.path().to_path_buf();
    match workspace.remove() {
        Ok(()) => log::debug!("已删除临时目录: {}", path.display()),
        Err(e) => log::warn!("删除临时目录 {} 失败: {}", path.display(), e),
    }
}
