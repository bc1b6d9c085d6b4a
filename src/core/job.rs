use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult, SegmentFailure};
use crate::core::planner::ByteRange;
use crate::core::progress::ProgressVector;

/// 任务状态机
///
/// `Idle → Probing → Planning → Fetching → Merging → Done`，任何非终止状态都可能转入 `Failed`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Probing,
    Planning,
    Fetching,
    Merging,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// 调用方持有的任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
}

impl JobHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// 调用方提交的下载请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub url: String,
    pub output: PathBuf,
    pub workers: usize,
}

/// 探测之后确定下来的任务参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadJob {
    pub url: String,
    pub output: PathBuf,
    pub worker_count: usize,
    pub total_size: u64,
    pub supports_ranges: bool,
}

/// 分段计划以及与之对应的进度计数器
#[derive(Debug)]
pub struct JobPlan {
    pub job: DownloadJob,
    pub ranges: Vec<ByteRange>,
    pub progress: Arc<ProgressVector>,
}

pub type JobOutcome = Result<PathBuf, DownloadError>;

/// 一个任务在协调器、聚合器和调用方之间共享的全部状态
#[derive(Debug)]
pub struct JobContext {
    pub handle: JobHandle,
    pub request: JobRequest,
    pub config: Config,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    plan: OnceLock<JobPlan>,
    outcome: OnceLock<JobOutcome>,
    started: Instant,
}

impl JobContext {
    pub fn new(request: JobRequest, config: Config) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            handle: JobHandle::new(),
            request,
            config,
            cancel: CancellationToken::new(),
            state,
            plan: OnceLock::new(),
            outcome: OnceLock::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// 进入新状态；终止状态之后的任何转换都会被忽略
    pub fn transition(&self, next: JobState) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            log::debug!("任务 {} 状态: {:?} -> {:?}", self.handle.id, state, next);
            *state = next;
            changed = true;
            true
        });
        changed
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn plan(&self) -> Option<&JobPlan> {
        self.plan.get()
    }

    pub fn set_plan(&self, plan: JobPlan) -> &JobPlan {
        self.plan.get_or_init(|| plan)
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.get()
    }

    /// 记录最终结果并进入终止状态
    pub fn finish(&self, outcome: JobOutcome) {
        let next = if outcome.is_ok() {
            JobState::Done
        } else {
            JobState::Failed
        };
        if self.outcome.set(outcome).is_err() {
            log::warn!("任务 {} 重复设置结果", self.handle.id);
            return;
        }
        self.transition(next);
    }

    /// 等待任务进入终止状态并返回结果
    pub async fn wait(&self) -> JobOutcome {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(JobState::is_terminal).await;
        self.outcome
            .get()
            .cloned()
            .unwrap_or(Err(DownloadError::Cancelled))
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

/// 记录每个分段的结果，按编号确定性地选出要报告的错误
#[derive(Debug)]
pub struct SegmentOutcomes {
    results: Vec<Option<DownloadResult<()>>>,
}

impl SegmentOutcomes {
    pub fn new(segments: usize) -> Self {
        Self {
            results: vec![None; segments],
        }
    }

    pub fn record(&mut self, index: usize, result: DownloadResult<()>) {
        if let Some(slot) = self.results.get_mut(index) {
            *slot = Some(result);
        }
    }

    /// 编号最小的真实错误；只有取消时才报告 `Cancelled`
    ///
    /// 用户取消由协调器先行判定，这里只处理分段自行上报的取消结果。
    pub fn first_failure(&self) -> Option<DownloadError> {
        let mut cancelled = false;
        for (index, result) in self.results.iter().enumerate() {
            match result {
                Some(Ok(())) => {}
                Some(Err(DownloadError::Cancelled)) => cancelled = true,
                Some(Err(error)) => return Some(error.clone()),
                None => return Some(DownloadError::segment(index, SegmentFailure::WorkerLost)),
            }
        }
        cancelled.then_some(DownloadError::Cancelled)
    }
}
