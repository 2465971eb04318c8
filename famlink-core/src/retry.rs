//! Bounded exponential backoff for transient store failures.
//!
//! Only [`StoreError::Unavailable`] is retried; every other failure is
//! returned to the caller immediately. Jitter spreads concurrent retriers
//! so a recovering backend is not hit by a synchronized wave.

use crate::config::RetryConfig;
use famlink_types::StoreError;
use std::future::Future;
use std::time::Duration;

/// A bounded retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Base delay, doubled per attempt.
    pub base_delay: Duration,
    /// Cap on the computed delay (jitter excluded).
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the retry following `attempt` (1-based).
    ///
    /// Formula: min(max_delay, base * 2^(attempt-1)) + random(0..base).
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        let base = self
            .base_delay
            .saturating_mul(factor)
            .min(self.max_delay);
        base + Duration::from_millis(random_jitter_ms(self.base_delay.as_millis() as u64))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op`, retrying transient failures per `policy`.
///
/// On failure returns the number of attempts made together with the final
/// error, so the caller can distinguish exhausted retries from an
/// immediate non-transient failure.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, (u32, StoreError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(StoreError::Unavailable(reason)) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "transient store failure (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    reason,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((attempt, e)),
        }
    }
}

/// Random jitter between 0 and `range` milliseconds.
fn random_jitter_ms(range: u64) -> u64 {
    if range == 0 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    u64::from_le_bytes(bytes) % (range + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_delay() {
        let policy = fast_policy(3);
        let result: Result<i32, _> = with_backoff(&policy, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_unavailable_until_success() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result = with_backoff(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Unavailable("flaky".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_unavailable() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Unavailable("down".into())) }
        })
        .await;

        let (attempts, err) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound("gone".into())) }
        })
        .await;

        let (attempts, err) = result.unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };

        // Base component: attempt 1 -> 100ms, attempt 2 -> 200ms,
        // attempt 4+ -> capped at 400ms. Jitter adds at most base.
        assert!(policy.delay_after(1) >= Duration::from_millis(100));
        assert!(policy.delay_after(2) >= Duration::from_millis(200));
        assert!(policy.delay_after(8) <= Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..50 {
            assert!(random_jitter_ms(10) <= 10);
        }
        assert_eq!(random_jitter_ms(0), 0);
    }
}
