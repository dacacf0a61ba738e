//! Bounded exponential retry for calls to external collaborators.
//!
//! Call sites wrap a single attempt and hand it to `execute_with_retry`;
//! they never loop on their own.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::resilience::error::TaskError;

/// Bounded exponential backoff: `initial_delay`, doubled per failed attempt,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Delay to sleep after the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// Runs `operation` up to `policy.max_attempts` times.
///
/// Only `Transient` errors are retried; any other kind is returned as-is after
/// the attempt that produced it. When the last attempt fails, the returned error
/// keeps the last failure's kind and names the attempt count.
///
/// Cancellation is observed both while an attempt is running and while sleeping
/// between attempts.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(TaskError::cancelled(format!(
                "{label} cancelled before attempt {attempt}"
            )));
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TaskError::cancelled(format!(
                "{label} cancelled during attempt {attempt}"
            ))),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.kind.is_retryable() {
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            warn!(
                operation = label,
                attempt,
                max_attempts = policy.max_attempts,
                error = %err,
                "Final attempt failed"
            );
            return Err(TaskError::new(
                err.kind,
                format!("{label} failed after {attempt} attempts: {}", err.message),
            ));
        }

        let delay = policy.delay_after(attempt);
        warn!(
            operation = label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TaskError::cancelled(format!(
                    "{label} cancelled while backing off after attempt {attempt}"
                )));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Bounds a single external call. Elapsed timeouts are `Transient` so the
/// surrounding retry loop may try again.
pub async fn with_timeout<T, Fut>(limit: Duration, label: &str, call: Fut) -> Result<T, TaskError>
where
    Fut: Future<Output = Result<T, TaskError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TaskError::transient(format!(
            "{label} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
