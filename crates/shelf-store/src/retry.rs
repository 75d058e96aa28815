//! # Retry Executor
//!
//! Runs an async operation under a [`RetryPolicy`], sleeping between
//! attempts. The interval sequence comes from `backoff::ExponentialBackoff`
//! configured without jitter, so the delays match
//! [`RetryPolicy::delay_for_attempt`] exactly.
//!
//! Also home of [`best_effort`], the single "attempt, log, continue" helper
//! used for audit logging and cache population.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use shelf_core::{RetryClassify, RetryPolicy};

/// Builds the interval sequence for a policy.
pub fn backoff_for(policy: &RetryPolicy) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: policy.base_delay,
        initial_interval: policy.base_delay,
        randomization_factor: 0.0,
        multiplier: policy.backoff_multiplier,
        max_interval: policy.max_delay,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent. The last error is returned as-is.
///
/// ## Example
/// ```rust,ignore
/// let config = with_retry(&RetryPolicy::config_read(), "get_config", || {
///     adapter.get_config()
/// })
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + Display,
{
    let mut backoff = backoff_for(policy);
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    warn!(operation = label, attempt, error = %err, "Giving up");
                }
                return Err(err);
            }
        }
    }
}

/// Awaits `fut` and swallows its error after logging it.
///
/// Returns `Some` on success so callers that care can still look at the
/// value.
pub async fn best_effort<T, E, Fut>(label: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(operation = label, error = %err, "Best-effort operation failed");
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{ConfigError, ErrorCode, PlatformType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn locked() -> ConfigError {
        ConfigError::new(ErrorCode::DatabaseLocked, PlatformType::RelationalEmbedded, "locked")
    }

    #[test]
    fn test_backoff_matches_policy() {
        let policy = RetryPolicy::relational();
        let mut backoff = backoff_for(&policy);
        for attempt in 1..=6 {
            assert_eq!(backoff.next_backoff(), Some(policy.delay_for_attempt(attempt)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), ConfigError> = with_retry(&RetryPolicy::relational(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(locked()) }
        })
        .await;

        assert_eq!(result.unwrap_err().code, ErrorCode::DatabaseLocked);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits between three attempts: 100ms + 200ms.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ConfigError> = with_retry(&RetryPolicy::relational(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ConfigError::new(
                    ErrorCode::InvalidConfig,
                    PlatformType::RelationalEmbedded,
                    "bad",
                ))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&RetryPolicy::relational(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(locked())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_best_effort_swallows() {
        let value = best_effort("ok", async { Ok::<_, ConfigError>(5) }).await;
        assert_eq!(value, Some(5));

        let value: Option<()> = best_effort("fails", async { Err(locked()) }).await;
        assert!(value.is_none());
    }
}
