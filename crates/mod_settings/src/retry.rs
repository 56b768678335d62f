//! Bounded retry for operations that can fail transiently, such as reading a
//! file another process briefly holds open.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts made before an operation is declared failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Base delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(25);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed,
    /// Delay multiplied by the number of the attempt that just failed
    #[default]
    Linear,
}

/// Retry bound and pacing for a fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Base delay between attempts
    pub delay: Duration,
    /// Growth of the delay
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
        }
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Backoff::Fixed)
    }

    /// Effective attempt bound.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt),
        }
    }
}

/// Every attempt of an operation failed.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryExhausted<E: std::error::Error + 'static> {
    /// Name of the operation, for diagnostics
    pub operation: String,
    /// Attempts made
    pub attempts: u32,
    /// Error from the last attempt
    pub source: E,
}

/// Runs `op` until it succeeds or the policy's attempt bound is reached.
///
/// `op` receives the 1-based attempt number. No delay follows the final
/// attempt.
///
/// # Returns
///
/// The first successful value, or [`RetryExhausted`] carrying the error of the
/// last attempt.
pub async fn retry_with_bound<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}/{}", operation, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{} failed after {} attempt(s): {}", operation, attempt, e);
                return Err(RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                debug!("{} attempt {}/{} failed: {}", operation, attempt, max_attempts, e);
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "file is locked")
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_millis(25));
        assert_eq!(policy.backoff, Backoff::Linear);
    }

    #[test]
    fn test_delay_growth() {
        let linear = RetryPolicy::new(5, Duration::from_millis(10), Backoff::Linear);
        assert_eq!(linear.delay_after(1), Duration::from_millis(10));
        assert_eq!(linear.delay_after(3), Duration::from_millis(30));

        let fixed = RetryPolicy::new(5, Duration::from_millis(10), Backoff::Fixed);
        assert_eq!(fixed.delay_after(4), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = retry_with_bound(&RetryPolicy::immediate(10), "read", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_bound() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_bound(&RetryPolicy::immediate(10), "write", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 10);
        assert_eq!(err.operation, "write");
        assert_eq!(err.source.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_bound(&RetryPolicy::immediate(0), "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5), Backoff::Linear);
        let started = std::time::Instant::now();

        let result: Result<(), _> =
            retry_with_bound(&policy, "read", |_| async { Err(transient()) }).await;

        assert!(result.is_err());
        // 5ms after the first failure, 10ms after the second, none after the last
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
