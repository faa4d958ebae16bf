//! Fixed-delay retry executor shared by every pipeline step.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry with a constant delay between attempts.
///
/// Every error is treated the same way: there is no classification into
/// transient and permanent failures, so wrapped operations must be safe to
/// run again from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Runs `operation` until it succeeds or `max_attempts` calls have failed.
    ///
    /// The closure receives the 1-based attempt number. After the last failed
    /// attempt the error is returned to the caller unchanged. A policy with
    /// `max_attempts == 0` still makes one attempt.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = label, attempt, "✓ Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    error!(
                        operation = label,
                        attempt,
                        max_attempts,
                        "❌ Giving up: {}",
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        "⚠️ Attempt failed: {}. Retrying in {}s...",
                        e,
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn default_policy_is_three_attempts_five_seconds_apart() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::new(3, Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let started = Instant::now();

        let result: Result<u32, String> = policy
            .execute("flaky", |attempt| {
                calls += 1;
                async move {
                    if attempt < 3 {
                        Err(format!("failure {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_runs_exactly_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let mut calls = 0;

        let result: Result<(), String> = policy
            .execute("broken", |attempt| {
                calls += 1;
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let policy = RetryPolicy::default();
        let started = Instant::now();

        let result: Result<&str, String> = policy.execute("ok", |_| async { Ok("done") }).await;

        assert_eq!(result, Ok("done"));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let mut calls = 0;

        let result: Result<(), &str> = policy
            .execute("once", |_| {
                calls += 1;
                async { Err("nope") }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
