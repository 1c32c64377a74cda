use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use taskloom_core::TaskloomResult;
use tracing::warn;

/// Caller-side retry behaviour for backend calls.
///
/// The gateway itself never retries; components that want retries wrap their
/// calls in [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy retrying `max_retries` times with the default delays.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling and capped.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are exhausted. The last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> TaskloomResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TaskloomResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                let delay = policy.compute_backoff(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskloom_core::TaskloomError;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
        }
    }

    #[test]
    fn test_compute_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 500,
        };
        assert_eq!(policy.compute_backoff(0), Duration::from_millis(100));
        assert_eq!(policy.compute_backoff(1), Duration::from_millis(200));
        assert_eq!(policy.compute_backoff(2), Duration::from_millis(400));
        assert_eq!(policy.compute_backoff(3), Duration::from_millis(500));
        assert_eq!(policy.compute_backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TaskloomError::provider_call("openai", "HTTP 503"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: TaskloomResult<()> = retry_with_backoff(&fast(3), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TaskloomError::provider_call("openai", "HTTP 400 Bad Request"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_policy_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: TaskloomResult<()> =
            retry_with_backoff(&RetryPolicy::default(), "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TaskloomError::provider_call("ollama", "HTTP 502"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
