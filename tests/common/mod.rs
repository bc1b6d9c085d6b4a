//! 集成测试用的本地 HTTP 文件服务器，可以按分段起点注入故障

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::head,
    Router,
};
use futures::stream::{self, StreamExt};

use rangefetch::config::Config;

/// 故障注入设置，键是 GET 请求 Range 的起始偏移
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub accept_ranges: bool,
    pub head_status: StatusCode,
    /// 这些分段发送一半后连接中断
    pub break_at: Vec<u64>,
    /// 这些分段发送少量数据后不再响应
    pub stall_at: Vec<u64>,
    /// 这些分段第一次请求时中断，之后正常
    pub fail_once_at: Vec<u64>,
    /// 声明支持 Range，但对带 Range 的 GET 仍返回 200 和完整内容
    pub ignore_range: bool,
    /// 这些分段返回的 Content-Range 整体前移一个字节
    pub shift_content_range_at: Vec<u64>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            accept_ranges: true,
            head_status: StatusCode::OK,
            break_at: Vec::new(),
            stall_at: Vec::new(),
            fail_once_at: Vec::new(),
            ignore_range: false,
            shift_content_range_at: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    content: Arc<Vec<u8>>,
    options: ServerOptions,
    failed_once: Arc<Mutex<HashSet<u64>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub content: Arc<Vec<u8>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}/file", self.addr)
    }

    /// 收到的所有 GET 请求的 Range 头
    pub fn ranges_requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// 确定性的测试数据
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub async fn spawn_server(content: Vec<u8>, options: ServerOptions) -> TestServer {
    let content = Arc::new(content);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = AppState {
        content: Arc::clone(&content),
        options,
        failed_once: Arc::new(Mutex::new(HashSet::new())),
        requests: Arc::clone(&requests),
    };

    let app = Router::new()
        .route("/file", head(handle_head).get(handle_get))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer {
        addr,
        content,
        requests,
    }
}

/// 测试用配置：采样间隔短、缓冲区小，不读写用户配置文件
pub fn test_config() -> Config {
    Config {
        progress_interval_ms: 50,
        buffer_size: 1024,
        read_timeout_secs: 10,
        probe_timeout_secs: 10,
        connect_timeout_secs: 5,
        ..Config::default()
    }
}

pub fn assert_no_artifacts(output: &Path) {
    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    assert!(!Path::new(&tmp).exists(), "临时目录未删除");
    assert!(!output.exists(), "不应留下输出文件");
}

async fn handle_head(State(state): State<AppState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if state.options.head_status.is_success() {
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&state.content.len().to_string()).unwrap(),
        );
    }
    if state.options.accept_ranges {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }
    (state.options.head_status, headers)
}

async fn handle_get(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let total = state.content.len();
    let raw_range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Some(range) = &raw_range {
        state.requests.lock().unwrap().push(range.clone());
    }

    let range = raw_range
        .as_deref()
        .filter(|_| state.options.accept_ranges && !state.options.ignore_range)
        .and_then(|value| parse_range(value, total));
    let (status, start, end) = match range {
        Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end),
        None => (StatusCode::OK, 0, total - 1),
    };

    let slice = Bytes::copy_from_slice(&state.content[start..=end]);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&slice.len().to_string()).unwrap(),
    );
    let key = start as u64;
    if status == StatusCode::PARTIAL_CONTENT {
        let shift = usize::from(state.options.shift_content_range_at.contains(&key));
        let content_range = format!("bytes {}-{}/{}", start - shift, end - shift, total);
        response_headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&content_range).unwrap(),
        );
    }

    let fail_once = state.options.fail_once_at.contains(&key)
        && state.failed_once.lock().unwrap().insert(key);

    let body = if state.options.break_at.contains(&key) || fail_once {
        let half = slice.slice(..slice.len() / 2);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(half),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected failure")),
        ];
        Body::from_stream(stream::iter(chunks))
    } else if state.options.stall_at.contains(&key) {
        let prefix = slice.slice(..slice.len().min(100));
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(prefix)]).chain(stream::pending());
        Body::from_stream(chunks)
    } else {
        Body::from(slice)
    };

    (status, response_headers, body).into_response()
}

fn parse_range(value: &str, total: usize) -> Option<(usize, usize)> {
    let value = value.strip_prefix("bytes=")?;
    let (start, end) = value.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse().ok()?;
    (start <= end && end < total).then_some((start, end))
}

/// 等待某个条件成立，超时返回 false
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
