use std::path::Path;

use url::Url;

use crate::core::error::{DownloadError, DownloadResult};

pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

pub fn validate_url(url: &str) -> DownloadResult<()> {
    if !is_valid_url(url) {
        return Err(DownloadError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

pub fn validate_worker_count(workers: usize, max_workers: usize) -> DownloadResult<()> {
    if workers == 0 {
        return Err(DownloadError::InvalidConfig("线程数必须大于0".to_string()));
    }
    if workers > max_workers {
        return Err(DownloadError::InvalidConfig(format!(
            "线程数 {} 超过上限 {}",
            workers, max_workers
        )));
    }
    Ok(())
}

/// 输出路径不能为空，也不能是已存在的目录
pub fn validate_output_path(path: &Path) -> DownloadResult<()> {
    if path.as_os_str().is_empty() {
        return Err(DownloadError::InvalidConfig("输出路径不能为空".to_string()));
    }
    if path.is_dir() {
        return Err(DownloadError::InvalidConfig(format!(
            "输出路径是一个目录: {}",
            path.display()
        )));
    }
    Ok(())
}
