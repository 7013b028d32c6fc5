//! Generic retry wrapper with exponential backoff and jitter.
//!
//! Every request against the info service goes through `retry_with_backoff`.
//! Media loads do not: a broken image is handled by the renderer's failure
//! path instead.

use log::warn;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::ExponentialBackoff;
use tokio_retry2::{Retry, RetryError};

/// Bounds and shape of the backoff schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each subsequent one.
    pub base_delay: Duration,
    /// Upper bound of the uniformly random jitter added to every delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delays slept between attempts: `base_delay * 2^n` plus jitter, one
    /// fewer than `max_attempts` so the last failure is returned at once.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_jitter = self.max_jitter;
        // ExponentialBackoff yields factor * 2^(n+1), so half the base gives base * 2^n.
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .map(move |delay| delay + jitter_up_to(max_jitter))
            .take(self.max_attempts.max(1) as usize - 1)
    }
}

fn jitter_up_to(max_jitter: Duration) -> Duration {
    let jitter_ms = max_jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 0-based attempt number. The error of the last attempt is
/// returned unchanged; there is no sleep after the final failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    Retry::spawn(policy.strategy(), || {
        let current = attempt;
        attempt += 1;
        let fut = op(current);
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    if current + 1 < attempts {
                        warn!("{}: attempt {} failed, retrying: {}", label, current + 1, e);
                    } else {
                        warn!("{}: attempt {} failed, giving up: {}", label, current + 1, e);
                    }
                    Err(RetryError::Transient { err: e, retry_after: None })
                }
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { max_jitter: Duration::ZERO, ..RetryPolicy::default() }
    }

    #[test]
    fn schedule_doubles_from_base_and_skips_the_last_attempt() {
        let delays: Vec<Duration> = no_jitter().strategy().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
    }

    #[test]
    fn single_attempt_policy_never_sleeps() {
        let policy = RetryPolicy { max_attempts: 1, ..no_jitter() };
        assert_eq!(policy.strategy().count(), 0);
    }

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..100 {
            let delays: Vec<Duration> = RetryPolicy::default().strategy().collect();
            assert!(delays[1] >= Duration::from_millis(1000));
            assert!(delays[1] <= Duration::from_millis(1200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fourth_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let result: Result<u32, String> = retry_with_backoff(&no_jitter(), "test", |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 { Err(format!("fail {}", attempt)) } else { Ok(attempt) }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(500 + 1000 + 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_without_fifth_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = retry_with_backoff(&no_jitter(), "test", |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("fail {}", attempt))
            }
        })
        .await;

        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let started = Instant::now();
        let result: Result<&str, String> =
            retry_with_backoff(&RetryPolicy::default(), "test", |_| async { Ok("fine") }).await;
        assert_eq!(result, Ok("fine"));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
