//! Retry policy for failed download attempts.
//!
//! Provides:
//! - Linear backoff with uniform jitter (`[1, 3) × attempt × unit`)
//! - Max attempt limits
//! - The [`Retryable`] classification used by the worker loop
//!
//! The loop itself lives next to the download job (`download::worker`) because each
//! attempt needs a fresh job and mutable access to the per-URL progress reporter.

use std::time::Duration;
use thiserror::Error;

use crate::download::control::DownloadControl;
use crate::download::error::DownloadError;

/// Retry-related errors.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts exhausted
    #[error("Max attempts ({max_attempts}) exhausted")]
    MaxRetriesExhausted { max_attempts: u32, last_error: E },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Retry strategy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Multiplied by the jitter factor and the attempt number
    pub backoff_unit: Duration,
    /// Lower bound of the jitter factor
    pub jitter_min: f64,
    /// Upper bound (exclusive) of the jitter factor
    pub jitter_max: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            jitter_min: 1.0,
            jitter_max: 3.0,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts (at least one).
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Sets the backoff unit.
    #[must_use]
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Disables jitter: every delay is exactly `jitter_min × attempt × unit`.
    #[must_use]
    pub fn no_jitter(mut self) -> Self {
        self.jitter_max = self.jitter_min;
        self
    }

    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        let factor = if self.jitter_max > self.jitter_min {
            self.jitter_min + rand::random::<f64>() * (self.jitter_max - self.jitter_min)
        } else {
            self.jitter_min
        };
        self.backoff_unit.mul_f64(factor * f64::from(failed_attempt.max(1)))
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error)
    pub result: Result<T, RetryError<E>>,
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent, including backoff sleeps
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns true if all attempts were exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.result, Err(RetryError::MaxRetriesExhausted { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, Err(RetryError::Cancelled))
    }
}

/// Determines if an error is retryable.
pub trait Retryable {
    /// Returns true if the error should be retried.
    fn is_retryable(&self) -> bool;
}

impl Retryable for DownloadError {
    /// Everything except cancellation. `MergeUnavailable` is retried too even though
    /// it will fail again until the tool is installed.
    fn is_retryable(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Sleeps for `delay` unless the control is cancelled first.
///
/// Returns `false` when the sleep was cut short by cancellation.
pub async fn backoff_sleep(delay: Duration, control: &DownloadControl) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = control.cancelled() => false,
    }
}
