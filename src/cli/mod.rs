//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`rangefetch <url>`
//! - 指定输出：`rangefetch -o /tmp/file.zip <url>`
//! - 指定线程：`rangefetch -w 8 <url>`
//! - 指定配置：`rangefetch -c rangefetch.toml <url>`
//! - 编辑配置：`rangefetch -e`
//! - JSON 输出：`rangefetch --json <url>`
//!
//! ## 配置文件位置
//!
//! - Windows: `%APPDATA%/rangefetch/rangefetch.toml`
//! - macOS: `~/Library/Application Support/rangefetch/rangefetch.toml`
//! - Linux: `~/.config/rangefetch/rangefetch.toml`

use clap::Parser;
use log::LevelFilter;
use std::env;
use std::path::PathBuf;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::utils::validator::validate_worker_count;

/// 无法从 URL 推断文件名时使用的名字
pub const FALLBACK_OUTPUT_NAME: &str = "downloaded_file";

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/rangefetch/rangefetch.toml", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/rangefetch/rangefetch.toml", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/rangefetch/rangefetch.toml", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

fn parse_log_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("无效的日志级别: {}", value))
}

/// 取 URL 路径的最后一段作为文件名
pub fn default_output_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_OUTPUT_NAME.to_string())
}

/// RangeFetch 命令行参数
///
/// 示例用法：
///   rangefetch https://example.com/file.zip
///   rangefetch -w 8 -o /tmp/file.zip https://example.com/file.zip
///   rangefetch -e  # 编辑配置文件
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangefetch",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    about = "一个用 Rust 编写的 HTTP Range 并行分块下载工具",
    long_about = "先用 HEAD 请求探测文件大小和 Range 支持，再把文件切成多个分段并行下载，最后按顺序合并。\n\n下载过程中按 'c' 或 Ctrl-C 取消。\n\n示例：\n  rangefetch https://example.com/file.zip\n  rangefetch -w 8 -o /tmp/file.zip https://example.com/file.zip\n  rangefetch --json https://example.com/file.zip\n"
)]
pub struct Args {
    /// 要下载的URL
    #[arg(required_unless_present = "edit_config", help = "要下载的URL（http 或 https）。")]
    pub url: Option<String>,

    /// 输出文件路径
    #[arg(short = 'o', long, help = "输出文件路径，默认取URL中的文件名。")]
    pub output: Option<PathBuf>,

    /// 下载线程数
    #[arg(short = 'w', long, help = "下载线程数（分段数），覆盖配置文件中的设置。")]
    pub workers: Option<usize>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 以 JSON 行输出进度
    #[arg(long, help = "每次进度更新输出一行 JSON，适合被其他程序调用。")]
    pub json: bool,

    /// 日志级别
    #[arg(long, default_value = "info", value_parser = parse_log_level, help = "日志级别：off/error/warn/info/debug/trace。")]
    pub log_level: LevelFilter,

    /// 分段失败后的重试次数
    #[arg(long, help = "分段失败后的重试次数，0 表示不重试。")]
    pub retries: Option<usize>,

    /// 日志文件路径
    #[arg(long, help = "把日志写入文件而不是终端。")]
    pub log_file: Option<String>,
}

impl Args {
    /// 解析命令行参数并加载配置；指定 `-e` 时打开编辑器后直接退出
    pub fn parse_args() -> DownloadResult<(Self, Config)> {
        let args = Args::parse();

        if args.edit_config {
            // 确保配置文件存在再打开
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 读取配置文件并用命令行参数覆盖
    pub fn load_config(&self) -> DownloadResult<Config> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        if let Some(workers) = self.workers {
            validate_worker_count(workers, config.max_workers)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn url(&self) -> DownloadResult<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| DownloadError::InvalidUrl("未提供URL".to_string()))
    }

    pub fn output_path(&self) -> DownloadResult<PathBuf> {
        match &self.output {
            Some(path) => Ok(path.clone()),
            None => Ok(PathBuf::from(default_output_name(self.url()?))),
        }
    }
}
