//! Retry with exponential backoff for fallible async operations
//!
//! Used by callers of backend requests. The cache itself never retries.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::RetryConfig;

/// How many times to attempt an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// The waits applied between consecutive attempts, in order
    ///
    /// Starts at `initial_delay` and doubles, never exceeding `max_delay`.
    /// Yields `max_attempts - 1` values.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max_delay = self.max_delay;
        let first = self.initial_delay.min(max_delay);
        std::iter::successors(Some(first), move |delay| {
            Some(delay.saturating_mul(2).min(max_delay))
        })
        .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// No attempt was made (the policy allows zero attempts)
    #[error("Retry attempts exhausted without running the operation")]
    Exhausted,

    /// Every attempt failed; holds the error from the last one
    #[error("{0}")]
    Failed(E),
}

impl<E> RetryError<E> {
    /// The last error returned by the operation, if it ran at all
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted => None,
            RetryError::Failed(err) => Some(err),
        }
    }
}

/// Runs `operation` until it succeeds or the policy's attempts run out
///
/// # Behavior
/// - Returns the first success immediately
/// - Sleeps only between attempts, never before the first or after the last
/// - After the final failure returns `RetryError::Failed` with that failure
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = policy.delays();
    let mut last_error = None;

    for _ in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => last_error = Some(err),
        }

        match delays.next() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => break,
        }
    }

    Err(last_error.map_or(RetryError::Exhausted, RetryError::Failed))
}
