use std::time::Duration;

use awc::http::header::{self, HeaderMap};
use serde::Serialize;

use crate::core::error::{DownloadError, DownloadResult};

/// HEAD 探测得到的远程文件信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeInfo {
    pub size: u64,
    pub supports_ranges: bool,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// 发送 HEAD 请求，获取文件大小和 Range 支持情况
pub async fn probe(client: &awc::Client, url: &str, timeout: Duration) -> DownloadResult<ProbeInfo> {
    let request = client
        .head(url)
        .insert_header((header::ACCEPT, "*/*"))
        .no_decompress();
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| DownloadError::RemoteUnavailable(format!("{}: 探测超时 ({:?})", url, timeout)))?
        .map_err(|e| DownloadError::RemoteUnavailable(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::RemoteUnavailable(format!(
            "服务器返回状态码 {}",
            status
        )));
    }

    let info = probe_info_from_headers(response.headers())?;
    log::debug!(
        "探测完成: {} 大小 {} 字节, Range 支持: {}, ETag: {:?}",
        url,
        info.size,
        info.supports_ranges,
        info.etag
    );
    Ok(info)
}

/// 从响应头解析文件信息；缺失或非正的 Content-Length 视为大小未知
pub fn probe_info_from_headers(headers: &HeaderMap) -> DownloadResult<ProbeInfo> {
    let size = header_str(headers, &header::CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&len| len > 0)
        .and_then(|len| u64::try_from(len).ok())
        .ok_or(DownloadError::SizeUnknown)?;

    let supports_ranges = header_str(headers, &header::ACCEPT_RANGES)
        .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
        .unwrap_or(false);

    Ok(ProbeInfo {
        size,
        supports_ranges,
        last_modified: header_str(headers, &header::LAST_MODIFIED).map(str::to_string),
        etag: header_str(headers, &header::ETAG).map(str::to_string),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
