use std::io::IsTerminal;
use std::time::{Duration, Instant};

use actix::prelude::*;
use anyhow::Context as _;
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;

use rangefetch::cli::Args;
use rangefetch::core::{
    AwaitJob, CancelJob, DownloadError, JobHandle, JobProgress, JobRunner, QueryProgress, StartJob,
};
use rangefetch::ui::{print_error, print_success, JobSummary, ProgressManager};
use rangefetch::utils::logger::init_logger;

const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// 退出时恢复终端
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // 解析参数和配置
    let (args, config) = match Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            print_error(&format!("参数解析失败: {}", e));
            std::process::exit(2);
        }
    };

    init_logger(args.log_level, config.log_file.as_deref()).context("无法初始化日志")?;
    log::info!(
        "rangefetch {} (构建时间: {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("未知")
    );
    log::debug!("{}", config.summary());

    let url = args.url()?.to_string();
    let output = args.output_path()?;
    let workers = config.worker_count;
    let started = Instant::now();

    let runner = JobRunner::new(config).start();
    let handle = runner
        .send(StartJob {
            url,
            output,
            workers,
        })
        .await??;

    if !args.json {
        println!("开始下载... (按 'c' 取消)");
    }
    let last = run_progress_loop(&runner, handle, args.json).await?;

    match runner.send(AwaitJob { handle }).await? {
        Ok(path) => {
            if !args.json {
                print_success(&format!("下载完成: {}", path.display()));
                print!(
                    "{}",
                    JobSummary {
                        output: path,
                        total_size: last.bytes_total,
                        workers: last.workers,
                        elapsed_time: started.elapsed(),
                    }
                );
            }
            Ok(())
        }
        Err(e) => {
            if !args.json {
                print_error(&format!("下载失败: {}", e));
            }
            let code = match e {
                DownloadError::Cancelled => 130,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

/// 轮询进度直到任务结束，期间监听取消按键
async fn run_progress_loop(
    runner: &Addr<JobRunner>,
    handle: JobHandle,
    json: bool,
) -> anyhow::Result<JobProgress> {
    let interactive = !json && std::io::stdin().is_terminal();
    // 终端不可用时退化为只响应 Ctrl-C 信号
    let raw_mode = if interactive { RawModeGuard::enable().ok() } else { None };
    let keys_enabled = raw_mode.is_some();

    let progress_bar = if json {
        ProgressManager::hidden()
    } else {
        ProgressManager::new()
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(PROGRESS_UPDATE_INTERVAL);
    let mut cancel_sent = false;

    loop {
        let mut cancel_requested = false;
        tokio::select! {
            _ = &mut ctrl_c, if !cancel_sent => cancel_requested = true,
            _ = ticker.tick() => {}
        }
        if keys_enabled && !cancel_sent && cancel_key_pressed()? {
            cancel_requested = true;
        }
        if cancel_requested {
            cancel_sent = true;
            match runner.send(CancelJob { handle }).await? {
                Ok(()) => log::info!("用户取消下载"),
                Err(e) => log::debug!("取消请求被忽略: {}", e),
            }
        }

        let progress = runner.send(QueryProgress { handle }).await??;
        if json {
            println!("{}", serde_json::to_string(&progress)?);
        } else {
            progress_bar.update(&progress);
        }

        if progress.state.is_terminal() {
            if !json {
                progress_bar.finish(&progress);
            }
            return Ok(progress);
        }
    }
}

/// 读取所有待处理的按键，遇到 'c' 或 Ctrl-C 返回 true
fn cancel_key_pressed() -> anyhow::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C')) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
