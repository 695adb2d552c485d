//! Single-item download state machine.
//!
//! One `DownloadJob` is one attempt at one URL:
//!   Queued → Selecting → Fetching → (Merging) → Finalizing → Completed
//! with Cancelled/Failed reachable from every active state. Temporary files are
//! tracked on the job and removed before it reports a terminal state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::core::utils::{build_output_path, normalize_audio_extension, remove_file_quiet, reserve_unique_path};
use crate::download::control::DownloadControl;
use crate::download::error::DownloadError;
use crate::download::format::{select_format, Selection};
use crate::download::merge::MergeTool;
use crate::download::progress::{sum_sizes, TransferProgress, UrlProgress};
use crate::download::source::StreamProvider;
use crate::download::types::{DownloadRequest, MediaKind, MediaType, StreamDescriptor};

/// Lifecycle of one download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Selecting,
    Fetching,
    Merging,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Selecting => "selecting",
            JobStatus::Fetching => "fetching",
            JobStatus::Merging => "merging",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators shared by every attempt of a URL.
///
/// `destination_dir` is a snapshot taken when the worker picked the URL up.
#[derive(Clone)]
pub struct JobContext {
    pub provider: Arc<dyn StreamProvider>,
    pub merger: Arc<dyn MergeTool>,
    pub control: DownloadControl,
    pub destination_dir: PathBuf,
}

/// Container the merged pair is written to. ffmpeg re-encodes audio to AAC, which
/// mp4 and mkv both accept; webm does not.
pub fn merged_extension(video_ext: &str) -> &'static str {
    if video_ext.eq_ignore_ascii_case("mp4") {
        "mp4"
    } else {
        "mkv"
    }
}

/// Per-attempt mutable state, owned by one worker.
#[derive(Debug)]
pub struct DownloadJob {
    pub id: Uuid,
    pub request: DownloadRequest,
    pub attempt: u32,
    pub status: JobStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub last_error: Option<DownloadError>,
    temp_files: Vec<PathBuf>,
}

impl DownloadJob {
    pub fn new(request: DownloadRequest, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            attempt,
            status: JobStatus::Queued,
            downloaded_bytes: 0,
            total_bytes: None,
            last_error: None,
            temp_files: Vec::new(),
        }
    }

    /// Temporary files this attempt created and has not cleaned up yet.
    pub fn temp_files(&self) -> &[PathBuf] {
        &self.temp_files
    }

    /// Runs the attempt to a terminal state. Temp files are gone when this returns.
    pub async fn run(&mut self, ctx: &JobContext, reporter: &mut UrlProgress) -> Result<PathBuf, DownloadError> {
        let result = self.drive(ctx, reporter).await;
        self.cleanup_temp_files();

        match &result {
            Ok(path) => {
                self.status = JobStatus::Completed;
                log::info!("[{}] saved {}", self.request.url, path.display());
            }
            Err(DownloadError::Cancelled) => {
                self.status = JobStatus::Cancelled;
                log::info!("[{}] attempt {} cancelled", self.request.url, self.attempt);
            }
            Err(e) => {
                self.status = JobStatus::Failed;
                self.last_error = Some(e.clone());
                log::warn!("[{}] attempt {} failed: {}", self.request.url, self.attempt, e);
            }
        }
        result
    }

    async fn drive(&mut self, ctx: &JobContext, reporter: &mut UrlProgress) -> Result<PathBuf, DownloadError> {
        check_cancelled(&ctx.control)?;

        self.enter(JobStatus::Selecting, reporter);
        let url = parse_reference(&self.request.url)?;
        let info = ctx.provider.list_descriptors(&url).await?;
        let rule = select_format(self.request.quality, self.request.media_type);
        let selection = rule.select(&info.descriptors)?;
        log::debug!(
            "[{}] '{}' rule {} -> {:?}",
            self.request.url,
            info.title,
            rule,
            selection.descriptors().iter().map(|d| d.id.as_str()).collect::<Vec<_>>()
        );

        check_cancelled(&ctx.control)?;
        tokio::fs::create_dir_all(&ctx.destination_dir).await.map_err(|e| {
            DownloadError::Filesystem(format!("cannot create {}: {}", ctx.destination_dir.display(), e))
        })?;

        self.enter(JobStatus::Fetching, reporter);
        let fetched = self.fetch_all(ctx, reporter, &url, &selection).await?;
        check_cancelled(&ctx.control)?;

        match (&selection, fetched.as_slice()) {
            (Selection::Pair { video, .. }, [video_path, audio_path]) => {
                self.enter(JobStatus::Merging, reporter);
                let desired = build_output_path(&ctx.destination_dir, &info.title, merged_extension(&video.container_ext));
                self.merge(ctx, video_path, audio_path, &desired).await
            }
            (Selection::Single(descriptor), [path]) => {
                self.enter(JobStatus::Finalizing, reporter);
                let ext = self.final_extension(descriptor);
                let desired = build_output_path(&ctx.destination_dir, &info.title, &ext);
                finalize(path, &desired).await
            }
            _ => Err(DownloadError::TransferError(format!(
                "expected {} fetched files, got {}",
                selection.descriptors().len(),
                fetched.len()
            ))),
        }
    }

    async fn fetch_all(
        &mut self,
        ctx: &JobContext,
        reporter: &mut UrlProgress,
        url: &Url,
        selection: &Selection,
    ) -> Result<Vec<PathBuf>, DownloadError> {
        let descriptors = selection.descriptors();
        let sizes: Vec<Option<u64>> = descriptors.iter().map(|d| d.approx_size_bytes).collect();
        self.total_bytes = sum_sizes(&sizes);

        let mut fetched = Vec::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            check_cancelled(&ctx.control)?;

            let label = transfer_label(descriptor);
            let temp = self.temp_path(&ctx.destination_dir, label, &descriptor.container_ext);
            self.temp_files.push(temp.clone());

            let remaining = sum_sizes(&sizes[i + 1..]);
            let mut sink = TransferProgress::new(
                &ctx.control,
                reporter,
                label,
                self.downloaded_bytes,
                sizes[i],
                remaining,
            );

            let result = ctx.provider.fetch(url, descriptor, &temp, &mut sink).await;
            let transferred = sink.total_bytes().unwrap_or(0).max(sink.bytes_done());
            drop(sink);

            let path = match result {
                Ok(path) => path,
                // Providers may return any error after an abort.
                Err(_) if ctx.control.is_cancelled() => return Err(DownloadError::Cancelled),
                Err(e) => return Err(e),
            };
            if path != temp {
                self.temp_files.push(path.clone());
            }
            self.downloaded_bytes = self.downloaded_bytes.saturating_add(transferred);
            fetched.push(path);
        }
        Ok(fetched)
    }

    async fn merge(
        &self,
        ctx: &JobContext,
        video: &Path,
        audio: &Path,
        desired: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let output = reserve_unique_path(desired)?;

        let result = tokio::select! {
            r = ctx.merger.merge(video, audio, &output) => r,
            _ = ctx.control.cancelled() => Err(DownloadError::Cancelled),
        };

        match result {
            Ok(()) => Ok(output),
            Err(e) => {
                remove_file_quiet(&output);
                Err(e)
            }
        }
    }

    fn final_extension(&self, descriptor: &StreamDescriptor) -> String {
        let ext = if descriptor.container_ext.is_empty() {
            "bin"
        } else {
            descriptor.container_ext.as_str()
        };
        match self.request.media_type {
            MediaType::AudioOnly => normalize_audio_extension(ext),
            _ => ext.to_string(),
        }
    }

    /// `.<job-id>-<label>.<ext>` inside the destination directory.
    fn temp_path(&self, dir: &Path, label: &str, ext: &str) -> PathBuf {
        let ext = if ext.is_empty() { "bin" } else { ext };
        dir.join(format!(".{}-{}.{}", self.id, label, ext))
    }

    fn enter(&mut self, status: JobStatus, reporter: &mut UrlProgress) {
        log::debug!("[{}] attempt {}: {} -> {}", self.request.url, self.attempt, self.status, status);
        self.status = status;
        reporter.status(status.as_str());
    }

    fn cleanup_temp_files(&mut self) {
        for path in self.temp_files.drain(..) {
            remove_file_quiet(&path);
        }
    }
}

// Covers unwinding out of `run`; after a normal run the list is already empty.
impl Drop for DownloadJob {
    fn drop(&mut self) {
        self.cleanup_temp_files();
    }
}

fn check_cancelled(control: &DownloadControl) -> Result<(), DownloadError> {
    if control.is_cancelled() {
        Err(DownloadError::Cancelled)
    } else {
        Ok(())
    }
}

fn parse_reference(raw: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(raw.trim()).map_err(|e| DownloadError::InvalidReference(format!("'{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DownloadError::InvalidReference(format!(
            "'{}': unsupported scheme '{}'",
            raw, other
        ))),
    }
}

fn transfer_label(descriptor: &StreamDescriptor) -> &'static str {
    match descriptor.media_kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
        MediaKind::Muxed => "media",
    }
}

/// Moves a fetched temp file to a freshly reserved final name.
async fn finalize(temp: &Path, desired: &Path) -> Result<PathBuf, DownloadError> {
    let output = reserve_unique_path(desired)?;
    if let Err(e) = tokio::fs::rename(temp, &output).await {
        remove_file_quiet(&output);
        return Err(DownloadError::Filesystem(format!(
            "cannot move {} to {}: {}",
            temp.display(),
            output.display(),
            e
        )));
    }
    Ok(output)
}
