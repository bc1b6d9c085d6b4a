//! Core: 分块并行下载引擎
//!
//! 探测 → 分段 → 并行下载 → 合并，由 `JobRunner` actor 对外提供启动、查询、取消接口。

pub mod buffer;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod merger;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod workspace;

// 只导出调用方实际用到的类型
pub use error::{DownloadError, DownloadResult, SegmentFailure};
pub use job::{JobHandle, JobOutcome, JobState};
pub use probe::ProbeInfo;
pub use runner::{AwaitJob, CancelJob, JobProgress, JobRunner, QueryProgress, StartJob, ValidateUrl};
