//! Bounded exponential-backoff retry for fallible async operations

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Retry policy: `max_attempts` retries after the first attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// No retries, fail on the first error
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Delay slept after failed attempt `attempt`: `base * 2^attempt`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Run `operation` until it succeeds or attempt `policy.max_attempts` fails
///
/// Attempts are numbered `0..=max_attempts`. The error of the last attempt
/// is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "with_retry: succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts => {
                let delay = backoff_delay(policy.base_delay, attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "with_retry: attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = operation_name, attempt, error = %err, "with_retry: giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn failing_then_ok(failures: u32, calls: &AtomicU32) -> impl Future<Output = Result<&'static str, String>> + '_ {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < failures {
                Err(format!("failure {}", n))
            } else {
                Ok("done")
            }
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 5), Duration::from_millis(3200));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(Duration::MAX, 3), Duration::MAX);
        assert_eq!(backoff_delay(Duration::from_secs(1), 40), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures_sleeps_doubling_schedule() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = Instant::now();

        let result = with_retry("test", &policy, || failing_then_ok(3, &calls)).await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(710), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let start = Instant::now();

        let result = with_retry("test", &policy, || failing_then_ok(0, &calls)).await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let start = Instant::now();

        let result = with_retry("test", &policy, || failing_then_ok(u32::MAX, &calls)).await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(40), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", &RetryPolicy::none(), || failing_then_ok(1, &calls)).await;

        assert_eq!(result, Err("failure 0".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
