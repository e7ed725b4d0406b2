//! Exponential backoff with decorrelated jitter.
//!
//! Only transient failures are retried here. Conditional-check conflicts
//! carry primitive-level meaning (lock held, wrong version, already exists)
//! and must never pass a `true` through `is_retryable`; primitives that
//! want to retry on contention (the lock wait loop, the pop visibility
//! race) run their own loops on top of [`backoff_delay_ms`].

use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Retry policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Initial delay in milliseconds.
    pub base_ms: u64,
    /// Delay ceiling in milliseconds.
    pub cap_ms: u64,
    /// Growth factor applied between attempts.
    pub multiplier: u32,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 50,
            cap_ms: 5_000,
            multiplier: 3,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying while `is_retryable` approves the error and
    /// attempts remain. Sleeps a decorrelated-jitter delay between attempts.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut prev_delay = self.base_ms;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.next_delay_ms(prev_delay);
                    debug!(operation, attempt, delay_ms = delay, error = %e, "retrying after transient failure");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    prev_delay = delay;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Next decorrelated-jitter delay: `min(cap, rand(base, prev * multiplier))`.
    fn next_delay_ms(&self, prev_delay: u64) -> u64 {
        let upper = prev_delay
            .saturating_mul(u64::from(self.multiplier))
            .max(self.base_ms + 1)
            .min(self.cap_ms.max(self.base_ms + 1));
        rand::rng().random_range(self.base_ms..upper).min(self.cap_ms)
    }
}

/// Full-jitter exponential delay for primitive-owned contention loops:
/// a uniform draw from `[0, min(cap, base * 2^attempt))`.
pub fn backoff_delay_ms(base_ms: u64, cap_ms: u64, attempt: u32) -> u64 {
    let ceiling = base_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        .min(cap_ms)
        .max(1);
    rand::rng().random_range(0..ceiling)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn backoff_respects_the_cap() {
        for attempt in 0..32 {
            let delay = backoff_delay_ms(100, 2_000, attempt);
            assert!(delay < 2_000);
        }
    }

    #[test]
    fn next_delay_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut prev = policy.base_ms;
        for _ in 0..20 {
            let delay = policy.next_delay_ms(prev);
            assert!(delay >= policy.base_ms || delay == policy.cap_ms);
            assert!(delay <= policy.cap_ms);
            prev = delay;
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_ms: 1,
            cap_ms: 2,
            multiplier: 2,
            max_attempts: 5,
        };

        let result: Result<u32, String> = policy
            .run("test", |_| true, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_ms: 1,
            cap_ms: 2,
            multiplier: 2,
            max_attempts: 5,
        };

        let result: Result<(), String> = policy
            .run("test", |_| false, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("conflict".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_ms: 1,
            cap_ms: 2,
            multiplier: 2,
            max_attempts: 3,
        };

        let result: Result<(), String> = policy
            .run("test", |_| true, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("still throttled".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
