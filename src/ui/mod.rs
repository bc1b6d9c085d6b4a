mod progress;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use progress::ProgressManager;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 任务结束后的摘要
pub struct JobSummary {
    pub output: PathBuf,
    pub total_size: u64,
    pub workers: usize,
    pub elapsed_time: Duration,
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "文件: {}", self.output.display())?;
        writeln!(f, "总大小: {}", format_size(self.total_size))?;
        writeln!(f, "线程数: {}", self.workers)?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        let secs = self.elapsed_time.as_secs_f64();
        if secs > 0.0 {
            writeln!(f, "平均速度: {}", format_speed(self.total_size as f64 / secs))?;
        }
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.2} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else if bytes_per_sec >= 1024.0 {
        format!("{:.2} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// 剩余时间；没有速度数据时显示“未知”
pub fn format_eta(eta_seconds: Option<f64>) -> String {
    let Some(eta) = eta_seconds.filter(|eta| eta.is_finite() && *eta >= 0.0) else {
        return "未知".to_string();
    };
    let seconds = eta.ceil() as u64;
    if seconds >= 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
