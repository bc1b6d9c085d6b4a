use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::core::error::{DownloadError, DownloadResult};

/// 按分段编号顺序把临时文件拼接成最终文件，返回写入的总字节数
///
/// 阻塞 IO，调用方应放在 `spawn_blocking` 中执行。
pub fn merge_segments(
    segments: &[PathBuf],
    output: &Path,
    expected_size: u64,
    cancel: &CancellationToken,
) -> DownloadResult<u64> {
    let merge_err = |action: &str, path: &Path, e: io::Error| {
        DownloadError::MergeFailed(format!("{} {} 失败: {}", action, path.display(), e))
    };

    let file = File::create(output).map_err(|e| merge_err("创建", output, e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for path in segments {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let segment = File::open(path).map_err(|e| merge_err("打开分段", path, e))?;
        let copied = io::copy(&mut BufReader::new(segment), &mut writer)
            .map_err(|e| merge_err("写入", output, e))?;
        log::debug!("合并 {} ({} 字节)", path.display(), copied);
        total += copied;
    }

    let file = writer
        .into_inner()
        .map_err(|e| merge_err("刷新", output, e.into_error()))?;
    file.sync_all().map_err(|e| merge_err("同步", output, e))?;

    if total != expected_size {
        return Err(DownloadError::MergeFailed(format!(
            "合并后大小 {} 字节, 预期 {} 字节",
            total, expected_size
        )));
    }
    Ok(total)
}

/// 删除不完整的输出文件
pub fn discard_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => log::debug!("已删除不完整的输出文件: {}", output.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("删除输出文件 {} 失败: {}", output.display(), e),
    }
}
