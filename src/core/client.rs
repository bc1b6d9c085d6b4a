use std::time::Duration;

use awc::http::header;

use crate::config::Config;

/// HTTP 客户端参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// 从发出请求到收到响应头的最长时间，由调用方用 `tokio::time::timeout` 施加
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn for_probe(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.probe_timeout(),
        }
    }

    pub fn for_segments(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.read_timeout(),
        }
    }
}

/// awc 客户端不能跨线程，每个下载线程各自创建
///
/// 关闭 awc 自带的整体超时，响应体的读取超时按每次读取单独计算。
pub fn build_client(settings: &ClientSettings) -> awc::Client {
    awc::Client::builder()
        .connector(awc::Connector::new().timeout(settings.connect_timeout))
        .disable_timeout()
        .add_default_header((header::USER_AGENT, settings.user_agent.clone()))
        .finish()
}
