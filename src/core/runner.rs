use std::path::PathBuf;
use std::sync::Arc;

use actix::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::core::client::{build_client, ClientSettings};
use crate::core::coordinator::Coordinator;
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::job::{JobContext, JobHandle, JobOutcome, JobRequest, JobState};
use crate::core::probe::{probe, ProbeInfo};
use crate::core::progress::{ProgressAggregator, ProgressSnapshot};
use crate::utils::validator::{validate_output_path, validate_url};

/// 调用方看到的任务进度
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub handle: JobHandle,
    pub state: JobState,
    pub percentage: f64,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub throughput: f64,
    pub eta_seconds: Option<f64>,
    pub workers: usize,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub failed_segment: Option<usize>,
}

struct ActiveJob {
    ctx: Arc<JobContext>,
    latest: ProgressSnapshot,
    aggregator: Option<SpawnHandle>,
}

impl ActiveJob {
    /// 重新汇总各分段计数；计划尚未生成时保留上一次结果
    fn refresh(&mut self) {
        if let Some(plan) = self.ctx.plan() {
            let aggregator = ProgressAggregator::new(plan.job.total_size, self.ctx.started());
            self.latest = aggregator.sample(&plan.progress);
        }
    }

    fn progress(&self) -> JobProgress {
        let error = match self.ctx.outcome() {
            Some(Err(e)) => Some(e),
            _ => None,
        };
        JobProgress {
            handle: self.ctx.handle,
            state: self.ctx.state(),
            percentage: self.latest.percentage,
            bytes_done: self.latest.bytes_done,
            bytes_total: self.latest.bytes_total,
            throughput: self.latest.throughput,
            eta_seconds: self.latest.eta_seconds,
            workers: self.ctx.plan().map(|plan| plan.ranges.len()).unwrap_or(0),
            error: error.map(ToString::to_string),
            error_kind: error.map(DownloadError::kind),
            failed_segment: error.and_then(DownloadError::segment_index),
        }
    }
}

/// 任务执行器：同一时间最多运行一个下载任务
pub struct JobRunner {
    config: Config,
    current: Option<ActiveJob>,
}

impl JobRunner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            current: None,
        }
    }

    fn active(&self, handle: JobHandle) -> DownloadResult<&ActiveJob> {
        match &self.current {
            None => Err(DownloadError::NoJobRunning),
            Some(job) if job.ctx.handle != handle => Err(DownloadError::UnknownJob(handle.id)),
            Some(job) => Ok(job),
        }
    }

    fn sample_progress(&mut self) {
        if let Some(job) = self.current.as_mut() {
            job.refresh();
        }
    }

    /// 协调器结束后做最后一次采样并停止定时器
    fn on_job_finished(&mut self, handle: JobHandle, ctx: &mut Context<Self>) {
        let Some(job) = self.current.as_mut() else {
            return;
        };
        if job.ctx.handle != handle {
            return;
        }
        job.refresh();
        if let Some(aggregator) = job.aggregator.take() {
            ctx.cancel_future(aggregator);
        }
        log::debug!("任务 {} 进度采样已停止", handle.id);
    }
}

impl Actor for JobRunner {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        log::debug!("任务执行器已启动");
    }
}

// ================== 消息与Handler定义 ==================

/// 启动下载任务
pub struct StartJob {
    pub url: String,
    pub output: PathBuf,
    pub workers: usize,
}
impl Message for StartJob { type Result = DownloadResult<JobHandle>; }

impl Handler<StartJob> for JobRunner {
    type Result = DownloadResult<JobHandle>;

    fn handle(&mut self, msg: StartJob, ctx: &mut Self::Context) -> Self::Result {
        if let Some(job) = &self.current {
            if !job.ctx.state().is_terminal() {
                return Err(DownloadError::JobAlreadyRunning);
            }
        }
        validate_url(&msg.url)?;
        validate_output_path(&msg.output)?;

        if let Some(previous) = self.current.take() {
            if let Some(aggregator) = previous.aggregator {
                ctx.cancel_future(aggregator);
            }
        }

        let workers = msg.workers.clamp(1, self.config.max_workers.max(1));
        if workers != msg.workers {
            log::warn!("线程数 {} 超出范围，调整为 {}", msg.workers, workers);
        }
        let job = Arc::new(JobContext::new(
            JobRequest {
                url: msg.url,
                output: msg.output,
                workers,
            },
            self.config.clone(),
        ));
        let handle = job.handle;
        log::info!("创建下载任务 {}: {}", handle.id, job.request.url);

        let aggregator = ctx.run_interval(self.config.progress_interval(), |runner, _ctx| {
            runner.sample_progress();
        });
        self.current = Some(ActiveJob {
            ctx: Arc::clone(&job),
            latest: ProgressSnapshot::default(),
            aggregator: Some(aggregator),
        });

        ctx.spawn(
            Coordinator::new(job)
                .run()
                .into_actor(self)
                .map(move |_outcome, runner, ctx| runner.on_job_finished(handle, ctx)),
        );
        Ok(handle)
    }
}

/// 查询任务进度
pub struct QueryProgress {
    pub handle: JobHandle,
}
impl Message for QueryProgress { type Result = DownloadResult<JobProgress>; }

impl Handler<QueryProgress> for JobRunner {
    type Result = DownloadResult<JobProgress>;

    fn handle(&mut self, msg: QueryProgress, _ctx: &mut Self::Context) -> Self::Result {
        self.active(msg.handle)?;
        let job = self.current.as_mut().ok_or(DownloadError::NoJobRunning)?;
        if job.ctx.state().is_terminal() {
            job.refresh();
        }
        Ok(job.progress())
    }
}

/// 取消正在运行的任务
pub struct CancelJob {
    pub handle: JobHandle,
}
impl Message for CancelJob { type Result = DownloadResult<()>; }

impl Handler<CancelJob> for JobRunner {
    type Result = DownloadResult<()>;

    fn handle(&mut self, msg: CancelJob, _ctx: &mut Self::Context) -> Self::Result {
        let job = self.active(msg.handle)?;
        if job.ctx.state().is_terminal() {
            return Err(DownloadError::NoJobRunning);
        }
        log::info!("取消下载任务 {}", msg.handle.id);
        job.ctx.cancel();
        Ok(())
    }
}

/// 等待任务结束并取得结果
pub struct AwaitJob {
    pub handle: JobHandle,
}
impl Message for AwaitJob { type Result = JobOutcome; }

impl Handler<AwaitJob> for JobRunner {
    type Result = ResponseFuture<JobOutcome>;

    fn handle(&mut self, msg: AwaitJob, _ctx: &mut Self::Context) -> Self::Result {
        match self.active(msg.handle) {
            Ok(job) => {
                let ctx = Arc::clone(&job.ctx);
                Box::pin(async move { ctx.wait().await })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}

/// 只探测不下载，用于提前检查 URL
pub struct ValidateUrl {
    pub url: String,
}
impl Message for ValidateUrl { type Result = DownloadResult<ProbeInfo>; }

impl Handler<ValidateUrl> for JobRunner {
    type Result = ResponseFuture<DownloadResult<ProbeInfo>>;

    fn handle(&mut self, msg: ValidateUrl, _ctx: &mut Self::Context) -> Self::Result {
        let settings = ClientSettings::for_probe(&self.config);
        Box::pin(async move {
            validate_url(&msg.url)?;
            let client = build_client(&settings);
            probe(&client, &msg.url, settings.request_timeout).await
        })
    }
}
