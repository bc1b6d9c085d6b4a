use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::job::JobState;
use crate::core::runner::JobProgress;
use crate::ui::{format_eta, format_speed};

/// 单任务进度条
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    /// 不输出任何内容，JSON 模式下使用
    pub fn hidden() -> Self {
        let manager = Self::new();
        manager.bar.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    pub fn update(&self, progress: &JobProgress) {
        if progress.bytes_total > 0 {
            self.bar.set_length(progress.bytes_total);
        }
        self.bar.set_position(progress.bytes_done);
        self.bar.set_message(status_line(progress));
    }

    pub fn finish(&self, progress: &JobProgress) {
        self.update(progress);
        match progress.state {
            JobState::Done => self.bar.finish(),
            _ => self.bar.abandon(),
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 进度条右侧的状态文字
pub fn status_line(progress: &JobProgress) -> String {
    match progress.state {
        JobState::Idle | JobState::Probing | JobState::Planning => "正在探测...".to_string(),
        JobState::Merging => "正在合并分段...".to_string(),
        JobState::Done => "完成".to_string(),
        JobState::Failed => format!("失败: {}", progress.error.as_deref().unwrap_or("未知错误")),
        JobState::Fetching => format!(
            "{:.1}% | {} | ETA:{} | {} 线程",
            progress.percentage,
            format_speed(progress.throughput),
            format_eta(progress.eta_seconds),
            progress.workers
        ),
    }
}
