use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::DownloadError;
use crate::core::retry::RetryStrategy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 默认下载线程数（分段数）
    pub worker_count: usize,
    /// 单个任务允许的最大线程数
    pub max_workers: usize,
    /// User-Agent
    pub user_agent: String,
    /// HEAD 探测超时（秒）
    pub probe_timeout_secs: u64,
    /// 建立连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 等待响应头以及每次读取数据的超时（秒）
    pub read_timeout_secs: u64,
    /// 分段写入缓冲区大小（字节）
    pub buffer_size: usize,
    /// 进度采样间隔（毫秒）
    pub progress_interval_ms: u64,
    /// 分段失败后的重试次数，0 表示不重试
    pub retry_count: usize,
    /// 重试基础延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 最大重试延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// 日志文件路径，不设置则输出到终端
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_workers: 32,
            user_agent: format!("rangefetch/{}", env!("CARGO_PKG_VERSION")),
            probe_timeout_secs: 60,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            buffer_size: 32 * 1024,
            progress_interval_ms: 500,
            retry_count: 0,
            retry_delay_ms: 1000,
            retry_max_delay_ms: 8000,
            log_file: None,
        }
    }
}

impl Config {
    /// 加载配置文件；文件不存在时写入带教程的默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if !Path::new(path).exists() {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                Ok(Config::default())
            }
        }
    }

    /// 保存带教程的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::InvalidConfig(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    fn generate_tutorial_content() -> String {
        r#"# RangeFetch 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   rangefetch https://example.com/file.zip                 # 使用默认配置
#   rangefetch -w 8 https://example.com/file.zip            # 使用8个线程
#   rangefetch -o /tmp/file.zip https://example.com/file.zip
#
# ==================== 下载设置 ====================
#
# worker_count          默认线程数；服务器不支持 Range 请求时自动降为 1
# max_workers           单个任务允许的最大线程数
# buffer_size           每个线程的写入缓冲区（字节）
#
# ==================== 网络设置 ====================
#
# probe_timeout_secs    HEAD 探测超时
# connect_timeout_secs  建立连接超时
# read_timeout_secs     等待响应头和每次读取的超时，卡住的连接不会无限等待
# user_agent            User-Agent 字符串
#
# ==================== 重试设置 ====================
#
# retry_count           分段失败后的重试次数，0 表示任何分段失败都会终止任务
# retry_delay_ms        第一次重试前的等待时间（指数退避）
# retry_max_delay_ms    重试延迟的最大值
#
# ==================== 其他 ====================
#
# progress_interval_ms  进度采样间隔
# log_file              日志文件路径（可选）

# ==================== 配置项 ====================
"#
        .to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.worker_count == 0 {
            return Err(DownloadError::InvalidConfig("线程数必须大于0".to_string()));
        }
        if self.max_workers == 0 {
            return Err(DownloadError::InvalidConfig("最大线程数必须大于0".to_string()));
        }
        if self.worker_count > self.max_workers {
            return Err(DownloadError::InvalidConfig(format!(
                "线程数 {} 超过上限 {}",
                self.worker_count, self.max_workers
            )));
        }
        if self.probe_timeout_secs == 0 || self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(DownloadError::InvalidConfig("超时时间必须大于0".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(DownloadError::InvalidConfig("缓冲区大小必须大于0".to_string()));
        }
        if self.progress_interval_ms == 0 {
            return Err(DownloadError::InvalidConfig("进度采样间隔必须大于0".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(DownloadError::InvalidConfig("User-Agent 不能为空".to_string()));
        }
        if self.retry_delay_ms > self.retry_max_delay_ms {
            return Err(DownloadError::InvalidConfig("重试基础延迟不能大于最大延迟".to_string()));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(workers) = args.workers {
            self.worker_count = workers.max(1);
        }
        if let Some(retries) = args.retries {
            self.retry_count = retries;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.retry_count,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryStrategy::default()
        }
    }

    /// 获取配置摘要信息
    pub fn summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 线程数: {} (上限 {})\n\
            - 超时: 探测 {} 秒, 连接 {} 秒, 读取 {} 秒\n\
            - 缓冲区: {} 字节\n\
            - 重试: {}\n\
            - 日志: {}",
            self.worker_count,
            self.max_workers,
            self.probe_timeout_secs,
            self.connect_timeout_secs,
            self.read_timeout_secs,
            self.buffer_size,
            if self.retry_count == 0 { "禁用".to_string() } else { format!("{} 次", self.retry_count) },
            self.log_file.as_deref().unwrap_or("终端"),
        )
    }
}
