//! Per-URL retry loop.
//!
//! Every attempt gets a fresh [`DownloadJob`]; the only state carried between
//! attempts is the per-URL [`UrlProgress`] (so the reported fraction stays
//! monotonic) and the attempt counter.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::core::retry::{backoff_sleep, RetryConfig, RetryError, RetryResult, Retryable};
use crate::download::error::{DownloadError, ErrorKind};
use crate::download::job::{DownloadJob, JobContext};
use crate::download::progress::{Outcome, UrlProgress};
use crate::download::types::DownloadRequest;

/// Runs `request` until it completes, is cancelled, or `config.max_attempts` fail.
///
/// `started` holds the number of the attempt in progress, so a supervisor can still
/// report it if the worker dies mid-attempt.
pub async fn run_with_retry(
    request: &DownloadRequest,
    ctx: &JobContext,
    config: &RetryConfig,
    reporter: &mut UrlProgress,
    started: &AtomicU32,
) -> RetryResult<PathBuf, DownloadError> {
    let start = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        started.store(attempt, Ordering::SeqCst);
        let mut job = DownloadJob::new(request.clone(), attempt);
        let error = match job.run(ctx, reporter).await {
            Ok(path) => {
                if attempt > 1 {
                    log::info!("[{}] succeeded on attempt {}/{}", request.url, attempt, max_attempts);
                }
                return RetryResult {
                    result: Ok(path),
                    attempts: attempt,
                    total_duration: start.elapsed(),
                };
            }
            Err(e) => e,
        };

        if error.is_cancelled() {
            return RetryResult {
                result: Err(RetryError::Cancelled),
                attempts: attempt,
                total_duration: start.elapsed(),
            };
        }

        if !error.is_retryable() || attempt >= max_attempts {
            log::error!(
                "[{}] giving up after {} attempt(s): {}",
                request.url,
                attempt,
                error
            );
            return RetryResult {
                result: Err(RetryError::MaxRetriesExhausted {
                    max_attempts: attempt,
                    last_error: error,
                }),
                attempts: attempt,
                total_duration: start.elapsed(),
            };
        }

        let delay = config.delay_for_attempt(attempt);
        log::warn!(
            "[{}] attempt {}/{} failed ({}), retrying in {:?}",
            request.url,
            attempt,
            max_attempts,
            error.kind(),
            delay
        );
        reporter.status(format!("attempt {} failed: {}", attempt, error.kind()));

        if !backoff_sleep(delay, &ctx.control).await {
            return RetryResult {
                result: Err(RetryError::Cancelled),
                attempts: attempt,
                total_duration: start.elapsed(),
            };
        }
        reporter.status(format!("retrying ({}/{})", attempt + 1, max_attempts));
    }
}

/// Maps a finished retry loop onto the caller-facing outcome.
pub fn outcome_from(result: RetryResult<PathBuf, DownloadError>) -> Outcome {
    let attempts = result.attempts;
    match result.result {
        Ok(path) => Outcome::Completed { path },
        Err(RetryError::Cancelled) => Outcome::Cancelled,
        Err(RetryError::MaxRetriesExhausted { last_error, .. }) => match last_error {
            DownloadError::Cancelled => Outcome::Cancelled,
            e => Outcome::Failed {
                kind: e.kind(),
                detail: e.message().to_string(),
                attempts,
            },
        },
    }
}

/// Outcome for a worker that died without reporting, during attempt `attempts`.
pub fn crashed_outcome(detail: impl Into<String>, attempts: u32) -> Outcome {
    Outcome::Failed {
        kind: ErrorKind::TransferError,
        detail: detail.into(),
        attempts: attempts.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_from_exhausted() {
        let result: RetryResult<PathBuf, DownloadError> = RetryResult {
            result: Err(RetryError::MaxRetriesExhausted {
                max_attempts: 3,
                last_error: DownloadError::TransferError("reset by peer".into()),
            }),
            attempts: 3,
            total_duration: Duration::from_secs(1),
        };
        assert_eq!(
            outcome_from(result),
            Outcome::Failed {
                kind: ErrorKind::TransferError,
                detail: "reset by peer".into(),
                attempts: 3,
            }
        );
    }

    #[test]
    fn test_outcome_from_success_and_cancel() {
        let ok: RetryResult<PathBuf, DownloadError> = RetryResult {
            result: Ok(PathBuf::from("/tmp/a.mp4")),
            attempts: 2,
            total_duration: Duration::ZERO,
        };
        assert_eq!(outcome_from(ok), Outcome::Completed { path: "/tmp/a.mp4".into() });

        let cancelled: RetryResult<PathBuf, DownloadError> = RetryResult {
            result: Err(RetryError::Cancelled),
            attempts: 1,
            total_duration: Duration::ZERO,
        };
        assert_eq!(outcome_from(cancelled), Outcome::Cancelled);
    }

    #[test]
    fn test_crashed_outcome_is_transfer_error() {
        assert!(matches!(
            crashed_outcome("worker panicked", 2),
            Outcome::Failed { kind: ErrorKind::TransferError, attempts: 2, .. }
        ));
        // Died before the first attempt was recorded.
        assert!(matches!(crashed_outcome("worker pool closed", 0), Outcome::Failed { attempts: 1, .. }));
    }
}
