use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// 单个分段下载失败的具体原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentFailure {
    #[error("服务器返回非预期状态码: {0}")]
    Status(u16),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("网络读取超时 ({0:?})")]
    Timeout(Duration),

    #[error("磁盘写入错误: {0}")]
    Disk(String),

    #[error("数据长度不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Content-Range 不匹配: 请求 {expected}, 响应 {got}")]
    RangeMismatch { expected: String, got: String },

    #[error("下载线程意外退出")]
    WorkerLost,
}

impl SegmentFailure {
    /// 网络抖动、超时、5xx 以及数据不足可以重试；其余视为永久失败
    pub fn is_retryable(&self) -> bool {
        match self {
            SegmentFailure::Network(_) | SegmentFailure::Timeout(_) => true,
            SegmentFailure::Status(code) => (500..600).contains(code),
            SegmentFailure::SizeMismatch { expected, actual } => actual < expected,
            SegmentFailure::Disk(_)
            | SegmentFailure::RangeMismatch { .. }
            | SegmentFailure::WorkerLost => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("远程资源不可用: {0}")]
    RemoteUnavailable(String),

    #[error("无法确定文件大小")]
    SizeUnknown,

    #[error("分段 {index} 下载失败: {cause}")]
    SegmentFetchFailed { index: usize, cause: SegmentFailure },

    #[error("合并分段失败: {0}")]
    MergeFailed(String),

    #[error("已有下载任务正在运行")]
    JobAlreadyRunning,

    #[error("没有正在运行的下载任务")]
    NoJobRunning,

    #[error("下载被取消")]
    Cancelled,

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("IO错误: {0}")]
    IoError(String),

    #[error("未知的任务: {0}")]
    UnknownJob(Uuid),

    #[error("任务管理器已停止")]
    MailboxClosed,
}

impl DownloadError {
    pub fn segment(index: usize, cause: SegmentFailure) -> Self {
        DownloadError::SegmentFetchFailed { index, cause }
    }

    /// 错误种类名称，随 `JobProgress` 一起返回给调用方
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::RemoteUnavailable(_) => "RemoteUnavailable",
            DownloadError::SizeUnknown => "SizeUnknown",
            DownloadError::SegmentFetchFailed { .. } => "SegmentFetchFailed",
            DownloadError::MergeFailed(_) => "MergeFailed",
            DownloadError::JobAlreadyRunning => "JobAlreadyRunning",
            DownloadError::NoJobRunning => "NoJobRunning",
            DownloadError::Cancelled => "Cancelled",
            DownloadError::InvalidUrl(_) => "InvalidUrl",
            DownloadError::InvalidConfig(_) => "InvalidConfig",
            DownloadError::IoError(_) => "IoError",
            DownloadError::UnknownJob(_) => "UnknownJob",
            DownloadError::MailboxClosed => "MailboxClosed",
        }
    }

    /// 失败分段的索引（仅分段错误有）
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            DownloadError::SegmentFetchFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::SegmentFetchFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(error: std::io::Error) -> Self {
        DownloadError::IoError(error.to_string())
    }
}

impl From<actix::MailboxError> for DownloadError {
    fn from(_: actix::MailboxError) -> Self {
        DownloadError::MailboxClosed
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
