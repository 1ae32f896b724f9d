//! Bounded retry with exponential backoff.
//!
//! Only errors the caller classifies as transient re-enter the operation;
//! everything else surfaces immediately. The backoff delay is a plain
//! `tokio::time::sleep`, so sibling tasks keep running while one backs off.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bounded retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            backoff_base_ms: 0,
        }
    }

    /// Delay before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1)))
    }
}

/// Run `op` under `policy`, retrying errors for which `is_transient` holds.
///
/// `op` receives the 1-based attempt number. The final error is returned
/// unchanged once attempts are exhausted or a non-transient error appears.
pub async fn retry_with_backoff<T, E, C, F, Fut>(
    policy: &RetryPolicy,
    is_transient: C,
    mut op: F,
) -> Result<T, E>
where
    C: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_transient(&error) => {
                let delay = policy.delay_after(attempt);
                debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
