//! Mock stream provider
//!
//! Simulates chunked transfers with configurable delays and per-URL failure modes,
//! and tracks how many transfers run at the same time.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use tubebatch::download::{
    Checkpoint, DownloadError, MediaKind, SourceInfo, StreamDescriptor, StreamProvider, TransferProgress,
};

/// How the provider misbehaves for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureMode {
    /// Every fetch fails with a transfer error after writing one chunk
    AlwaysTransfer,
    /// The first `n` fetches fail on their last chunk, later ones succeed
    FailTimes(u32),
    /// Listing reports the content as unavailable
    Unavailable,
    /// The fetch panics
    Panic,
    /// The first `n` fetches fail with a transfer error, the next one panics
    FailThenPanic(u32),
}

/// Configuration for the mock provider
#[derive(Debug, Clone)]
pub struct MockProviderConfig {
    pub chunks: u32,
    pub chunk_size: u64,
    pub chunk_delay: Duration,
    pub title: String,
    pub descriptors: Vec<StreamDescriptor>,
}

impl Default for MockProviderConfig {
    fn default() -> Self {
        let chunks = 4;
        let chunk_size = 256;
        Self {
            chunks,
            chunk_size,
            chunk_delay: Duration::from_millis(2),
            title: "Test Video".to_string(),
            descriptors: vec![
                descriptor("137", MediaKind::Video, Some(1080), "mp4", Some(u64::from(chunks) * chunk_size), None),
                descriptor("140", MediaKind::Audio, None, "m4a", Some(u64::from(chunks) * chunk_size), Some(128.0)),
                descriptor("18", MediaKind::Muxed, Some(360), "mp4", Some(u64::from(chunks) * chunk_size), None),
            ],
        }
    }
}

impl MockProviderConfig {
    /// Slow transfers, for pause/cancel tests
    pub fn slow() -> Self {
        Self {
            chunks: 40,
            chunk_delay: Duration::from_millis(25),
            ..Self::default()
        }
    }
}

pub fn descriptor(
    id: &str,
    media_kind: MediaKind,
    height: Option<u32>,
    ext: &str,
    size: Option<u64>,
    kbps: Option<f64>,
) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        media_kind,
        height,
        approx_size_bytes: size,
        container_ext: ext.to_string(),
        bitrate_kbps: kbps,
    }
}

/// Decrements the active-transfer counter when a fetch ends, however it ends.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockProvider {
    config: MockProviderConfig,
    failures: HashMap<String, FailureMode>,
    titles: HashMap<String, String>,
    descriptors: HashMap<String, Vec<StreamDescriptor>>,
    fetches_per_url: Mutex<HashMap<String, u32>>,
    list_calls: AtomicU32,
    fetch_calls: AtomicU32,
    chunks_written: AtomicU32,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockProvider {
    pub fn new(config: MockProviderConfig) -> Self {
        Self {
            config,
            failures: HashMap::new(),
            titles: HashMap::new(),
            descriptors: HashMap::new(),
            fetches_per_url: Mutex::new(HashMap::new()),
            list_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            chunks_written: AtomicU32::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_failure(mut self, url: &str, mode: FailureMode) -> Self {
        self.failures.insert(url.to_string(), mode);
        self
    }

    pub fn with_title(mut self, url: &str, title: &str) -> Self {
        self.titles.insert(url.to_string(), title.to_string());
        self
    }

    /// Overrides the descriptor set reported for one URL.
    pub fn with_descriptors(mut self, url: &str, descriptors: Vec<StreamDescriptor>) -> Self {
        self.descriptors.insert(url.to_string(), descriptors);
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fetches_for(&self, url: &str) -> u32 {
        self.fetches_per_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn chunks_written(&self) -> u32 {
        self.chunks_written.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn write_chunk(&self, dest: &Path) -> Result<(), DownloadError> {
        let mut file = OpenOptions::new().create(true).append(true).open(dest)?;
        file.write_all(&vec![b'x'; self.config.chunk_size as usize])?;
        self.chunks_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StreamProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_descriptors(&self, url: &Url) -> Result<SourceInfo, DownloadError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.get(url.as_str()) == Some(&FailureMode::Unavailable) {
            return Err(DownloadError::SourceUnavailable("Private video".to_string()));
        }
        Ok(SourceInfo {
            title: self.titles.get(url.as_str()).cloned().unwrap_or_else(|| self.config.title.clone()),
            descriptors: self
                .descriptors
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| self.config.descriptors.clone()),
        })
    }

    async fn fetch(
        &self,
        url: &Url,
        _descriptor: &StreamDescriptor,
        dest: &Path,
        progress: &mut TransferProgress<'_>,
    ) -> Result<PathBuf, DownloadError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let nth = {
            let mut per_url = self.fetches_per_url.lock().unwrap();
            let count = per_url.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let total = u64::from(self.config.chunks) * self.config.chunk_size;
        let failure = self.failures.get(url.as_str()).cloned();

        for chunk in 1..=self.config.chunks {
            sleep(self.config.chunk_delay).await;
            self.write_chunk(dest)?;

            match &failure {
                Some(FailureMode::AlwaysTransfer) => {
                    return Err(DownloadError::TransferError("connection reset by peer".to_string()));
                }
                // Fails late so the failed attempt has already reported progress.
                Some(FailureMode::FailTimes(n)) if nth <= *n && chunk == self.config.chunks => {
                    return Err(DownloadError::TransferError(format!("flaky failure {}", nth)));
                }
                Some(FailureMode::Panic) => panic!("mock provider exploded"),
                Some(FailureMode::FailThenPanic(n)) if nth <= *n => {
                    return Err(DownloadError::TransferError(format!("flaky failure {}", nth)));
                }
                Some(FailureMode::FailThenPanic(_)) => panic!("mock provider exploded on attempt {}", nth),
                _ => {}
            }

            let done = u64::from(chunk) * self.config.chunk_size;
            if progress.update(done, Some(total)).await == Checkpoint::Abort {
                // Real providers surface whatever error their transport gives.
                return Err(DownloadError::TransferError("aborted".to_string()));
            }
        }
        Ok(dest.to_path_buf())
    }
}
