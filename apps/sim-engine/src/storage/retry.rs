//! Bounded exponential backoff for store calls.
//!
//! Only transient outages (`SimError::Unavailable`) are retried; everything
//! else propagates immediately. Exhausting the attempt budget surfaces the
//! last outage to the caller.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::SimError;

/// Retry configuration for store operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Backoff multiplier per retry.
    pub backoff_multiplier: f64,
    /// Jitter factor applied to each backoff.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), with jitter.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.cast_signed());
        let jitter_range = base_ms * self.jitter_factor;
        let mut rng = rand::rng();
        let jittered = if jitter_range > 0.0 {
            rng.random_range((base_ms - jitter_range).max(0.0)..=base_ms + jitter_range)
        } else {
            base_ms
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(jittered as u64)
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is
/// spent.
///
/// # Errors
///
/// The operation's own error, or `Unavailable` after the final attempt.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SimError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SimError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt);
                tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err,
                    "store call failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn success_passes_through() {
        let result = with_retries(&fast_policy(), || async { Ok::<_, SimError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_unavailable_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retries(&fast_policy(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SimError::Unavailable("outage".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SimError::Unavailable("outage".into())) }
        })
        .await;
        assert!(matches!(result, Err(SimError::Unavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SimError::NotFound("order".into())) }
        })
        .await;
        assert!(matches!(result, Err(SimError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = fast_policy();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(1));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(2));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(4));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        };
        for _ in 0..50 {
            let backoff = policy.backoff_for(0);
            assert!(backoff >= Duration::from_millis(80) && backoff <= Duration::from_millis(120));
        }
    }
}
