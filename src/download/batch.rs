//! Batch coordinator: runs many URLs with a bounded number of concurrent workers.
//!
//! Each `run_batch` call gets its own semaphore. Pause and cancel are shared by
//! every batch of a `Downloader` through one [`DownloadControl`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Semaphore};

use crate::core::config::{self, Settings};
use crate::core::retry::RetryConfig;
use crate::download::control::DownloadControl;
use crate::download::job::JobContext;
use crate::download::merge::{FfmpegMerger, MergeTool};
use crate::download::progress::{BatchEvent, Outcome, UrlProgress};
use crate::download::source::{ProviderCapabilities, StreamProvider, YtDlpProvider};
use crate::download::types::DownloadRequest;
use crate::download::worker::{crashed_outcome, outcome_from, run_with_retry};

/// Everything a worker task needs, cloned into it.
#[derive(Clone)]
struct Shared {
    provider: Arc<dyn StreamProvider>,
    merger: Arc<dyn MergeTool>,
    control: DownloadControl,
    destination_dir: Arc<RwLock<PathBuf>>,
    retry: RetryConfig,
}

impl Shared {
    fn destination_dir(&self) -> PathBuf {
        self.destination_dir
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Entry point of the engine.
///
/// # Example
///
/// ```no_run
/// use tubebatch::core::config::Settings;
/// use tubebatch::download::Downloader;
///
/// # async fn run() {
/// let downloader = Downloader::from_settings(Settings::default());
/// let handle = downloader.run_batch_with_defaults(["https://www.youtube.com/watch?v=dQw4w9WgXcQ"]);
/// for (url, outcome) in handle.collect_outcomes().await {
///     println!("{}: {}", url, outcome.label());
/// }
/// # }
/// ```
pub struct Downloader {
    shared: Shared,
    settings: Settings,
}

impl Downloader {
    pub fn new(provider: Arc<dyn StreamProvider>, merger: Arc<dyn MergeTool>, settings: Settings) -> Self {
        for setting in ignored_settings(&provider.capabilities(), &settings) {
            log::warn!("{} is set but provider '{}' does not support it", setting, provider.name());
        }
        let retry = RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .backoff_unit(config::retry::backoff_unit());
        Self {
            shared: Shared {
                provider,
                merger,
                control: DownloadControl::new(),
                destination_dir: Arc::new(RwLock::new(settings.destination_dir.clone())),
                retry,
            },
            settings,
        }
    }

    /// Downloader wired to the yt-dlp provider and the ffmpeg merger.
    pub fn from_settings(settings: Settings) -> Self {
        let provider = Arc::new(YtDlpProvider::from_settings(&settings));
        let merger = Arc::new(FfmpegMerger::new(settings.ffmpeg_bin.clone()).with_timeout(settings.merge_timeout));
        Self::new(provider, merger, settings)
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.shared.retry = retry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provider(&self) -> Arc<dyn StreamProvider> {
        Arc::clone(&self.shared.provider)
    }

    pub fn merger(&self) -> Arc<dyn MergeTool> {
        Arc::clone(&self.shared.merger)
    }

    /// Shared control handle, e.g. for a Ctrl-C handler.
    pub fn control(&self) -> DownloadControl {
        self.shared.control.clone()
    }

    pub fn pause(&self) -> bool {
        self.shared.control.pause()
    }

    pub fn resume(&self) -> bool {
        self.shared.control.resume()
    }

    pub fn cancel(&self) -> bool {
        self.shared.control.cancel()
    }

    pub fn destination_directory(&self) -> PathBuf {
        self.shared.destination_dir()
    }

    /// Changes where URLs not yet picked up by a worker are saved.
    pub fn set_destination_directory(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        log::info!("Destination directory set to {}", dir.display());
        *self
            .shared
            .destination_dir
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = dir;
    }

    /// Starts every request with at most `worker_limit` running at once.
    ///
    /// Must be called from within a tokio runtime. Every URL produces exactly one
    /// `BatchEvent::Finished`; the handle's stream closes after the last one.
    pub fn run_batch(&self, requests: Vec<DownloadRequest>, worker_limit: usize) -> BatchHandle {
        let worker_limit = worker_limit.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(worker_limit));
        let total = requests.len();

        log::info!("Starting batch of {} URL(s) with {} worker(s)", total, worker_limit);
        log::debug!(
            "Provider '{}' capabilities: {:?}",
            self.shared.provider.name(),
            self.shared.provider.capabilities()
        );

        for request in requests {
            let shared = self.shared.clone();
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let url = request.url.clone();
                let started = Arc::new(AtomicU32::new(0));
                let worker = tokio::spawn(process_url(request, shared, semaphore, tx.clone(), Arc::clone(&started)));
                if let Err(e) = worker.await {
                    let detail = if e.is_panic() {
                        "download worker panicked"
                    } else {
                        "download worker was aborted"
                    };
                    log::error!("[{}] {}: {}", url, detail, e);
                    let _ = tx.send(BatchEvent::Finished {
                        url,
                        outcome: crashed_outcome(detail, started.load(Ordering::SeqCst)),
                    });
                }
            });
        }

        BatchHandle { rx, total }
    }

    /// `run_batch` with the configured default quality, media type and worker limit.
    pub fn run_batch_with_defaults<I, S>(&self, urls: I) -> BatchHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = urls
            .into_iter()
            .map(|url| DownloadRequest::new(url, self.settings.default_quality, self.settings.default_media_type))
            .collect();
        self.run_batch(requests, self.settings.max_concurrent_downloads)
    }
}

/// Settings the provider cannot honor.
fn ignored_settings(caps: &ProviderCapabilities, settings: &Settings) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if settings.proxy.is_some() && !caps.proxy {
        ignored.push("YTDL_PROXY");
    }
    ignored
}

async fn process_url(
    request: DownloadRequest,
    shared: Shared,
    semaphore: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<BatchEvent>,
    started: Arc<AtomicU32>,
) {
    let mut reporter = UrlProgress::new(request.url.clone(), tx);

    let _permit = match Arc::clone(&semaphore).acquire_owned().await {
        Ok(p) => p,
        Err(e) => {
            log::error!("[{}] failed to acquire worker permit: {}", request.url, e);
            reporter.finish(crashed_outcome(format!("worker pool closed: {}", e), 0));
            return;
        }
    };

    if shared.control.is_cancelled() {
        reporter.finish(Outcome::Cancelled);
        return;
    }

    log::info!(
        "[{}] processing ({} / {}) (permits available: {})",
        request.url,
        request.quality,
        request.media_type,
        semaphore.available_permits()
    );

    let ctx = JobContext {
        provider: Arc::clone(&shared.provider),
        merger: Arc::clone(&shared.merger),
        control: shared.control.clone(),
        destination_dir: shared.destination_dir(),
    };

    let result = run_with_retry(&request, &ctx, &shared.retry, &mut reporter, &started).await;
    log::debug!(
        "[{}] finished after {} attempt(s) in {:?}",
        request.url,
        result.attempts,
        result.total_duration
    );
    let outcome = outcome_from(result);
    if outcome.is_completed() {
        reporter.report(Some(1.0), Some("completed".to_string()));
    }
    reporter.finish(outcome);
}

/// Receiving end of a batch.
pub struct BatchHandle {
    rx: mpsc::UnboundedReceiver<BatchEvent>,
    total: usize,
}

impl BatchHandle {
    /// Number of URLs in the batch.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Next progress or completion event; `None` once every worker is done.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.rx.recv().await
    }

    /// Drains the stream and returns the outcomes in completion order.
    pub async fn collect_outcomes(mut self) -> Vec<(String, Outcome)> {
        let mut outcomes = Vec::with_capacity(self.total);
        while let Some(event) = self.next_event().await {
            if let BatchEvent::Finished { url, outcome } = event {
                outcomes.push((url, outcome));
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_ignored_without_capability() {
        let settings = Settings {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..Settings::default()
        };
        assert_eq!(ignored_settings(&ProviderCapabilities::default(), &settings), vec!["YTDL_PROXY"]);

        let caps = ProviderCapabilities {
            proxy: true,
            reports_totals: true,
        };
        assert!(ignored_settings(&caps, &settings).is_empty());
        let no_proxy = Settings {
            proxy: None,
            ..Settings::default()
        };
        assert!(ignored_settings(&ProviderCapabilities::default(), &no_proxy).is_empty());
    }
}
