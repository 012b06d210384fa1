use std::future::Future;

use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use super::ProviderError;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubled for each later one)
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay to wait after `attempt` (1-based) fails: `min(base * 2^(attempt-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self
            .base_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(self.max_delay);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Retry a provider call with exponential backoff.
///
/// Only errors whose kind is retryable are attempted again; anything else is
/// returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(
                    operation = operation_name,
                    attempt,
                    kind = %e.kind,
                    "operation failed, not retrying"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::llm::ProviderErrorKind;

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(3, 1000);

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(8000));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };

        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_exhausted() {
        let config = RetryConfig::new(3, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::timeout("slow")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_fail_fast() {
        let config = RetryConfig::new(3, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::new(
                    ProviderErrorKind::Authentication,
                    "bad key",
                ))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let config = RetryConfig::new(3, 1);
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&config, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::new(ProviderErrorKind::RateLimit, "429"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
