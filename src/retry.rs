//! Retry wrapper for remote calls
//!
//! Linear backoff: the wait before attempt N+1 is `base_delay * N`. The last
//! error is re-raised unchanged so callers keep the original failure for
//! diagnostics. A classifier lets non-retryable failures (auth, malformed
//! request) short-circuit the loop instead of wasting attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry schedule for one remote call site
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3)
    pub max_attempts: u32,
    /// Delay before the second attempt; later waits grow linearly
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Classifier that retries every failure
pub fn retry_all<E>(_err: &E) -> bool {
    true
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Every failed attempt is logged at warn level with its index. When
/// `is_retryable` returns false the error is returned immediately without
/// consuming the remaining attempts.
pub async fn with_retry<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(
                    "{} attempt {}/{} failed: {}",
                    label, attempt, policy.max_attempts, err
                );
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                tokio::time::sleep(policy.base_delay * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", RetryPolicy::new(3, 100), retry_all, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(format!("boom {}", n))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_with_linear_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), String> =
            with_retry("test", RetryPolicy::new(3, 100), retry_all, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails".to_string()) }
            })
            .await;

        // Last error surfaces unchanged after exactly 3 attempts
        assert_eq!(result, Err("always fails".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits: 100ms then 200ms
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> =
            with_retry("test", RetryPolicy::new(3, 100), |_| false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("permission denied".to_string()) }
            })
            .await;

        assert_eq!(result, Err("permission denied".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
