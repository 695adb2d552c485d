//! Stream provider abstraction.
//!
//! A `StreamProvider` knows how to list the stream descriptors of a URL and how to
//! fetch one of them to a local path. The engine never looks behind this trait; the
//! built-in backend drives the yt-dlp binary.

pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

use crate::download::error::DownloadError;
use crate::download::progress::TransferProgress;
use crate::download::types::{SourceInfo, StreamDescriptor};

pub use ytdlp::YtDlpProvider;

/// Static description of what a provider supports, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Provider routes traffic through a configured proxy
    pub proxy: bool,
    /// Provider reports byte totals while transferring
    pub reports_totals: bool,
}

/// Trait for stream provider implementations.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Human-readable name of this provider (e.g., "yt-dlp")
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Lists the title and available descriptors for the URL.
    ///
    /// Fails with `SourceUnavailable`, `InvalidReference` or `TransferError`.
    async fn list_descriptors(&self, url: &Url) -> Result<SourceInfo, DownloadError>;

    /// Transfers one descriptor to `dest` and returns the path actually written.
    ///
    /// Must call `progress.update()` as bytes arrive and stop (returning any error)
    /// as soon as it answers `Checkpoint::Abort`. Fails with `TransferError`.
    async fn fetch(
        &self,
        url: &Url,
        descriptor: &StreamDescriptor,
        dest: &Path,
        progress: &mut TransferProgress<'_>,
    ) -> Result<PathBuf, DownloadError>;
}
