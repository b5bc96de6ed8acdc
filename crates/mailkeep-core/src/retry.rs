//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::time::Duration;

use tracing::warn;

/// Classifies errors for retrying.
pub trait Retryable {
    /// Returns true if repeating the same operation may succeed.
    fn is_transient(&self) -> bool;
}

/// Retry limits for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay)
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded.
    Success(T),
    /// Every attempt failed with a transient error.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        error: E,
    },
    /// A non-transient error stopped retrying.
    Fatal(E),
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    F: AsyncFnMut(u32) -> Result<T, E>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(error) if !error.is_transient() => return RetryOutcome::Fatal(error),
            Err(error) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, max_attempts, ?delay, %error, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
