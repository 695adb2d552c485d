//! Muxing separate video and audio tracks into one container.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, stderr_tail, FFMPEG_TIMEOUT, PROBE_TIMEOUT, STDERR_TAIL_CHARS};
use crate::download::error::DownloadError;

/// External muxer seam.
#[async_trait]
pub trait MergeTool: Send + Sync {
    fn name(&self) -> &str;

    /// Quick probe used for start-up diagnostics. `merge` does not depend on it.
    async fn is_available(&self) -> bool;

    /// Muxes `video` and `audio` into `output`, overwriting it.
    ///
    /// Success means a zero exit status and a non-empty output file. A missing binary
    /// is `MergeUnavailable`; everything else is `MergeFailed` with the tool's stderr.
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// Merge tool driving the ffmpeg binary: video copied, audio re-encoded to AAC.
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    bin: String,
    timeout: Duration,
}

impl FfmpegMerger {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            timeout: FFMPEG_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn merge_command(&self, video: &Path, audio: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error").arg("-y");
        cmd.arg("-i").arg(video).arg("-i").arg(audio);
        cmd.arg("-map").arg("0:v:0").arg("-map").arg("1:a:0");
        cmd.arg("-c:v").arg("copy").arg("-c:a").arg("aac");
        cmd.arg(output);
        cmd
    }
}

#[async_trait]
impl MergeTool for FfmpegMerger {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-version");
        run_with_timeout(&mut cmd, PROBE_TIMEOUT)
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let mut cmd = self.merge_command(video, audio, output);
        log::debug!("Merging {} + {} -> {}", video.display(), audio.display(), output.display());

        let out = match run_with_timeout(&mut cmd, self.timeout).await {
            Ok(out) => out,
            Err(e) if e.is_not_found() => {
                return Err(DownloadError::MergeUnavailable(format!(
                    "'{}' not found; install ffmpeg or set FFMPEG_BIN",
                    self.bin
                )));
            }
            Err(AppError::Timeout(secs)) => {
                return Err(DownloadError::MergeFailed(format!("ffmpeg timed out after {}s", secs)));
            }
            Err(e) => return Err(DownloadError::MergeFailed(e.to_string())),
        };

        if !out.status.success() {
            let tail = stderr_tail(&out.stderr, STDERR_TAIL_CHARS);
            log::error!("FFmpeg merge error: {}", tail);
            return Err(DownloadError::MergeFailed(if tail.is_empty() {
                format!("ffmpeg exited with status {:?}", out.status.code())
            } else {
                tail
            }));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(DownloadError::MergeFailed(format!(
                "ffmpeg produced no output at {}",
                output.display()
            ))),
        }
    }
}
