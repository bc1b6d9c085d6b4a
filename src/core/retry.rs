use std::time::Duration;

use crate::core::error::DownloadError;

/// 分段重试策略
///
/// 默认 `max_retries = 0`：任何分段失败都直接终止任务。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免多个分段同时重试
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    pub fn should_retry(&self, error: &DownloadError, retry_count: usize) -> bool {
        retry_count < self.max_retries && error.is_retryable()
    }

    pub fn get_delay(&self, retry_count: usize) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (delay_secs + jitter).clamp(0.0, self.max_delay.as_secs_f64());

        Duration::from_secs_f64(final_delay)
    }
}

/// 单个分段的重试上下文
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub retry_count: usize,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            retry_count: 0,
        }
    }

    pub fn should_retry(&self, error: &DownloadError) -> bool {
        self.strategy.should_retry(error, self.retry_count)
    }

    /// 记录一次重试，返回本次应等待的时间
    pub fn record_retry(&mut self) -> Duration {
        let delay = self.strategy.get_delay(self.retry_count);
        self.retry_count += 1;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SegmentFailure;

    fn network_error() -> DownloadError {
        DownloadError::segment(1, SegmentFailure::Network("connection reset".to_string()))
    }

    #[test]
    fn test_default_strategy_never_retries() {
        let strategy = RetryStrategy::default();
        assert!(!strategy.should_retry(&network_error(), 0));
    }

    #[test]
    fn test_retry_budget() {
        let strategy = RetryStrategy {
            max_retries: 2,
            ..RetryStrategy::default()
        };
        assert!(strategy.should_retry(&network_error(), 0));
        assert!(strategy.should_retry(&network_error(), 1));
        assert!(!strategy.should_retry(&network_error(), 2));

        let client_error = DownloadError::segment(0, SegmentFailure::Status(404));
        assert!(!strategy.should_retry(&client_error, 0));
        assert!(!strategy.should_retry(&DownloadError::Cancelled, 0));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let strategy = RetryStrategy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(strategy.get_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.get_delay(1), Duration::from_millis(200));
        assert_eq!(strategy.get_delay(2), Duration::from_millis(400));
        assert_eq!(strategy.get_delay(3), Duration::from_millis(500));
        assert_eq!(strategy.get_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_near_base() {
        let strategy = RetryStrategy {
            max_retries: 1,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            ..RetryStrategy::default()
        };
        for _ in 0..50 {
            let delay = strategy.get_delay(0);
            assert!(delay >= Duration::from_millis(950), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1050), "{:?}", delay);
        }
    }

    #[test]
    fn test_retry_context_records_attempts() {
        let mut context = RetryContext::new(RetryStrategy {
            max_retries: 1,
            jitter_factor: 0.0,
            ..RetryStrategy::default()
        });
        assert!(context.should_retry(&network_error()));
        let delay = context.record_retry();
        assert_eq!(delay, Duration::from_secs(1));
        assert_eq!(context.retry_count, 1);
        assert!(!context.should_retry(&network_error()));
    }
}
