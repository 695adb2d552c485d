//! Progress events sent to the caller and the sinks that produce them.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::download::control::{Checkpoint, DownloadControl};
use crate::download::error::ErrorKind;

/// Fractional progress for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub url: String,
    /// In `[0, 1]`, never decreasing for a given URL
    pub fraction: f32,
    pub status_text: Option<String>,
}

/// Terminal result for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { path: PathBuf },
    Cancelled,
    Failed { kind: ErrorKind, detail: String, attempts: u32 },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::Cancelled => "cancelled",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Everything a batch reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Progress(ProgressEvent),
    Finished { url: String, outcome: Outcome },
}

/// Per-URL labeled end of the batch channel.
///
/// Owned by the worker for the lifetime of its URL (across retries), which is what
/// keeps the reported fraction monotonic: a fresh attempt starts its byte count at
/// zero, but the caller never sees the bar go backwards.
#[derive(Debug)]
pub struct UrlProgress {
    url: String,
    tx: mpsc::UnboundedSender<BatchEvent>,
    last_fraction: f32,
}

impl UrlProgress {
    pub fn new(url: impl Into<String>, tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        Self {
            url: url.into(),
            tx,
            last_fraction: 0.0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn last_fraction(&self) -> f32 {
        self.last_fraction
    }

    /// Sends a progress event. `None` keeps the current fraction (indeterminate).
    pub fn report(&mut self, fraction: Option<f32>, status_text: Option<String>) {
        if let Some(f) = fraction {
            let f = if f.is_finite() { f.clamp(0.0, 1.0) } else { 0.0 };
            self.last_fraction = self.last_fraction.max(f);
        }
        let event = ProgressEvent {
            url: self.url.clone(),
            fraction: self.last_fraction,
            status_text,
        };
        // Receiver gone means nobody is listening any more; the download continues.
        let _ = self.tx.send(BatchEvent::Progress(event));
    }

    /// Status-only update.
    pub fn status(&mut self, text: impl Into<String>) {
        self.report(None, Some(text.into()));
    }

    pub(crate) fn finish(self, outcome: Outcome) {
        let _ = self.tx.send(BatchEvent::Finished { url: self.url, outcome });
    }
}

/// Sum of sizes, `None` if any is unknown. Saturates instead of overflowing on
/// absurd provider-reported sizes.
pub(crate) fn sum_sizes(sizes: &[Option<u64>]) -> Option<u64> {
    sizes
        .iter()
        .try_fold(0u64, |acc, size| size.map(|size| acc.saturating_add(size)))
}

/// Sink handed to a stream provider for one transfer.
///
/// Providers call [`TransferProgress::update`] for every chunk and must stop the
/// transfer when it answers [`Checkpoint::Abort`]. The sink does the pause wait and
/// the cancellation check, and accounts bytes toward the job-wide fraction.
pub struct TransferProgress<'a> {
    control: &'a DownloadControl,
    reporter: &'a mut UrlProgress,
    label: &'a str,
    /// Bytes of the job's transfers that already finished
    completed_bytes: u64,
    /// Expected size of this transfer, from the descriptor
    expected_bytes: Option<u64>,
    /// Expected size of transfers that have not started yet
    remaining_expected: Option<u64>,
    bytes_done: u64,
    reported_total: Option<u64>,
}

impl<'a> TransferProgress<'a> {
    pub fn new(
        control: &'a DownloadControl,
        reporter: &'a mut UrlProgress,
        label: &'a str,
        completed_bytes: u64,
        expected_bytes: Option<u64>,
        remaining_expected: Option<u64>,
    ) -> Self {
        Self {
            control,
            reporter,
            label,
            completed_bytes,
            expected_bytes,
            remaining_expected,
            bytes_done: 0,
            reported_total: None,
        }
    }

    /// Control flags of the owning downloader, for providers that block on I/O.
    pub fn control(&self) -> &'a DownloadControl {
        self.control
    }

    /// Bytes transferred so far by this transfer.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    /// Best known size of this transfer.
    pub fn total_bytes(&self) -> Option<u64> {
        self.reported_total.or(self.expected_bytes)
    }

    /// Job-wide fraction, or `None` while any size is unknown.
    pub fn job_fraction(&self) -> Option<f32> {
        let total = self
            .completed_bytes
            .saturating_add(self.total_bytes()?)
            .saturating_add(self.remaining_expected?);
        if total == 0 {
            return None;
        }
        let done = self.completed_bytes.saturating_add(self.bytes_done);
        Some((done as f64 / total as f64).min(1.0) as f32)
    }

    /// Progress tick from the provider.
    pub async fn update(&mut self, bytes_done: u64, bytes_total: Option<u64>) -> Checkpoint {
        if self.control.is_cancelled() {
            return Checkpoint::Abort;
        }
        if self.control.wait_while_paused().await == Checkpoint::Abort {
            return Checkpoint::Abort;
        }

        self.bytes_done = self.bytes_done.max(bytes_done);
        if let Some(total) = bytes_total.filter(|t| *t > 0) {
            self.reported_total = Some(total);
        }

        let fraction = self.job_fraction();
        let text = match fraction {
            Some(_) => format!("downloading {}", self.label),
            None => format!("downloading {} (size unknown)", self.label),
        };
        self.reporter.report(fraction, Some(text));
        Checkpoint::Proceed
    }
}
