//! Retry policy and backoff executor for outbound calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
///
/// One instance is shared by every outbound client; callers that need a
/// different budget pass their own policy per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Multiplier for exponential backoff, at least 1.
    pub backoff_factor: f64,
    /// Delay before the first retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a validated policy. `initial_delay_secs` is in (fractional) seconds.
    pub fn new(max_retries: u32, backoff_factor: f64, initial_delay_secs: f64) -> Result<Self> {
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(Error::config(format!(
                "retry backoff factor must be >= 1, got {backoff_factor}"
            )));
        }
        if !initial_delay_secs.is_finite() || initial_delay_secs <= 0.0 {
            return Err(Error::config(format!(
                "retry initial delay must be > 0, got {initial_delay_secs}"
            )));
        }

        Ok(Self {
            max_retries,
            backoff_factor,
            initial_delay: Duration::from_secs_f64(initial_delay_secs),
        })
    }

    /// Total number of times the operation may run.
    #[inline]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the failed attempt with the given zero-based index.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// Classified upstream errors are returned unchanged after the last
/// attempt; anything else is wrapped into [`Error::RetriesExhausted`].
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = policy.total_attempts();
    let mut attempt = 0u32;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!(operation = op_name, error = %err, "Client error (not retryable)");
            return Err(err);
        }

        if attempt >= policy.max_retries {
            error!(
                operation = op_name,
                attempts = total,
                error = %err,
                "All retry attempts failed"
            );
            return Err(if err.is_classified() {
                err
            } else {
                Error::RetriesExhausted {
                    attempts: total,
                    last: err.to_string(),
                }
            });
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation = op_name,
            error = %err,
            "Attempt {}/{} failed, retrying in {:.2}s",
            attempt + 1,
            total,
            delay.as_secs_f64()
        );

        sleep(delay).await;
        attempt += 1;
    }
}
