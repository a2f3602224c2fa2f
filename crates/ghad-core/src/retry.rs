//! Shared retry policy for downstream cloud APIs.
//!
//! Every client takes an explicit [`RetryPolicy`] instead of relying on
//! library defaults, so tests can pin the policy to zero delay and zero
//! attempts. The policy is exponential: the first retry waits
//! `initial_delay`, and each subsequent retry doubles the previous wait.
//!
//! Errors opt into retrying through the [`Retryable`] trait. The convention
//! across the crate is that transport failures, HTTP 429 and HTTP 5xx are
//! retryable while other client errors are permanent.

use std::future::Future;
use std::time::Duration;

/// Exponential backoff configuration shared by all downstream clients.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry. Doubles on each subsequent retry.
    pub initial_delay: Duration,

    /// Maximum number of retries after the initial attempt. Zero means a
    /// single attempt with no retries.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy with the given initial delay and retry budget.
    #[must_use]
    pub const fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_attempts,
        }
    }

    /// A policy that never retries and never sleeps. Used by tests.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Returns the delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        // Saturate instead of overflowing for absurd retry counts.
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 3)
    }
}

/// Classification of an error as transient or permanent.
pub trait Retryable {
    /// Returns `true` when the operation that produced this error may be
    /// retried under the shared policy.
    fn is_retryable(&self) -> bool;
}

/// Runs `op` under `policy`, retrying errors that report themselves
/// retryable until the retry budget is exhausted.
///
/// The terminal error (retryable or not) is returned unchanged so callers
/// can surface status codes verbatim.
pub async fn with_retries<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retry < policy.max_attempts => {
                let delay = policy.delay_for(retry);
                tracing::warn!(error = %err, retry = retry + 1, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                retry += 1;
            },
            Err(err) => return Err(err),
        }
    }
}

/// Returns `true` when an HTTP status should be treated as transient.
///
/// 429 signals rate limiting, 5xx signals a server-side fault; both are
/// worth retrying. Every other status is permanent.
#[must_use]
pub const fn status_is_retryable(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn zero_policy_has_zero_delay() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(7), Duration::ZERO);
    }

    #[test]
    fn status_classification() {
        assert!(status_is_retryable(429));
        assert!(status_is_retryable(500));
        assert!(status_is_retryable(503));
        assert!(status_is_retryable(599));
        assert!(!status_is_retryable(400));
        assert!(!status_is_retryable(401));
        assert!(!status_is_retryable(404));
        assert!(!status_is_retryable(200));
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_retries(&RetryPolicy::none(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, 5);
        let result: Result<u32, TestError> = with_retries(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, 2);
        let result: Result<u32, TestError> = with_retries(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: true }) }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, 5);
        let result: Result<u32, TestError> = with_retries(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
