//! YtDlpProvider: the built-in stream provider, powered by the yt-dlp binary.
//!
//! Listing runs `yt-dlp --dump-single-json` and maps its `formats` array onto
//! [`StreamDescriptor`]s. Fetching runs yt-dlp for exactly one `format_id` with
//! `--newline` so every progress update arrives as its own stdout line.

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use url::Url;

use crate::core::config::Settings;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, METADATA_TIMEOUT};
use crate::core::utils::remove_file_quiet;
use crate::download::control::Checkpoint;
use crate::download::error::DownloadError;
use crate::download::progress::TransferProgress;
use crate::download::source::{ProviderCapabilities, StreamProvider};
use crate::download::types::{MediaKind, SourceInfo, StreamDescriptor};
use crate::download::ytdlp_errors::to_download_error;

/// Stream provider backed by the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlpProvider {
    bin: String,
    proxy: Option<String>,
    metadata_timeout: Duration,
}

impl YtDlpProvider {
    pub fn new(bin: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            proxy,
            metadata_timeout: METADATA_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ytdlp_bin.clone(), settings.proxy.clone()).with_metadata_timeout(settings.metadata_timeout)
    }

    #[must_use]
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["--no-playlist", "--no-warnings"]);
        if let Some(proxy) = &self.proxy {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn process_error(&self, err: AppError) -> DownloadError {
        if err.is_not_found() {
            return DownloadError::TransferError(format!("'{}' not found; is yt-dlp installed?", self.bin));
        }
        match err {
            AppError::Timeout(secs) => DownloadError::TransferError(format!("yt-dlp timed out after {}s", secs)),
            other => DownloadError::TransferError(format!("failed to run '{}': {}", self.bin, other)),
        }
    }
}

#[async_trait]
impl StreamProvider for YtDlpProvider {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            proxy: self.proxy.is_some(),
            reports_totals: true,
        }
    }

    async fn list_descriptors(&self, url: &Url) -> Result<SourceInfo, DownloadError> {
        let mut cmd = self.base_command();
        cmd.arg("--dump-single-json").arg(url.as_str());

        log::debug!("Listing formats for {} via {}", url, self.bin);
        let output = run_with_timeout(&mut cmd, self.metadata_timeout)
            .await
            .map_err(|e| self.process_error(e))?;

        if !output.status.success() {
            let err = to_download_error(&output.stderr, output.status.code());
            log::warn!("yt-dlp listing failed for {}: {}", url, err);
            return Err(err);
        }

        let info = parse_source_info(&output.stdout)?;
        log::debug!("{}: '{}' with {} descriptors", url, info.title, info.descriptors.len());
        Ok(info)
    }

    async fn fetch(
        &self,
        url: &Url,
        descriptor: &StreamDescriptor,
        dest: &Path,
        progress: &mut TransferProgress<'_>,
    ) -> Result<PathBuf, DownloadError> {
        let mut cmd = self.base_command();
        cmd.arg("-f")
            .arg(&descriptor.id)
            .arg("-o")
            .arg(dest)
            .args(["--newline", "--force-overwrites", "--no-mtime"])
            .arg(url.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| self.process_error(AppError::Io(e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::TransferError("yt-dlp stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::TransferError("yt-dlp stderr was not captured".to_string()))?;

        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let control = progress.control();
        let mut lines = BufReader::new(stdout).lines();
        let mut aborted = false;

        loop {
            let line = tokio::select! {
                _ = control.cancelled() => {
                    aborted = true;
                    break;
                }
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read yt-dlp output: {}", e);
                    break;
                }
            };

            let Some(info) = parse_progress(&line) else {
                log::trace!("yt-dlp: {}", line);
                continue;
            };
            let (done, total) = transfer_counts(&info, descriptor);
            if progress.update(done, total).await == Checkpoint::Abort {
                aborted = true;
                break;
            }
        }

        if aborted {
            let _ = child.kill().await;
            stderr_task.abort();
            cleanup_partial(dest);
            return Err(DownloadError::Cancelled);
        }

        let status = child.wait().await.map_err(|e| self.process_error(AppError::Io(e)))?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            cleanup_partial(dest);
            return Err(to_download_error(&stderr, status.code()));
        }

        let size = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                cleanup_partial(dest);
                return Err(DownloadError::TransferError(format!(
                    "yt-dlp exited successfully but {} was not written",
                    dest.display()
                )));
            }
        };
        // Final tick so the job accounts the real size. A cancel landing here is
        // picked up by the job before its next stage.
        let _ = progress.update(size, Some(size)).await;

        Ok(dest.to_path_buf())
    }
}

/// Bytes done and total for a progress line, falling back to the descriptor's size
/// when yt-dlp does not print a usable total.
fn transfer_counts(info: &ProgressInfo, descriptor: &StreamDescriptor) -> (u64, Option<u64>) {
    match (info.current_size, info.total_size) {
        (Some(done), total) => (done, total),
        (None, _) => match descriptor.approx_size_bytes {
            Some(size) => ((size as f64 * f64::from(info.percent) / 100.0) as u64, Some(size)),
            None => (0, None),
        },
    }
}

/// Removes the output and yt-dlp's sidecar files for it.
fn cleanup_partial(dest: &Path) {
    remove_file_quiet(dest);
    for suffix in [".part", ".ytdl"] {
        let mut name = OsString::from(dest.as_os_str());
        name.push(suffix);
        remove_file_quiet(Path::new(&name));
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    filesize: Option<f64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
}

impl RawFormat {
    /// `None` for storyboards and other formats without any media track.
    fn into_descriptor(self) -> Option<StreamDescriptor> {
        let has = |codec: &Option<String>| codec.as_deref().map_or(true, |c| c != "none");
        let media_kind = match (has(&self.vcodec), has(&self.acodec)) {
            (true, true) => MediaKind::Muxed,
            (true, false) => MediaKind::Video,
            (false, true) => MediaKind::Audio,
            (false, false) => return None,
        };
        let size = self
            .filesize
            .or(self.filesize_approx)
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| s as u64);

        Some(StreamDescriptor {
            id: self.format_id,
            media_kind,
            height: self.height.filter(|h| *h > 0),
            approx_size_bytes: size,
            container_ext: self.ext.unwrap_or_default(),
            bitrate_kbps: self.abr.or(self.tbr),
        })
    }
}

/// Parses a `--dump-single-json` document.
pub(crate) fn parse_source_info(json: &[u8]) -> Result<SourceInfo, DownloadError> {
    let raw: RawInfo = serde_json::from_slice(json)
        .map_err(|e| DownloadError::TransferError(format!("unparseable yt-dlp metadata: {}", e)))?;

    Ok(SourceInfo {
        title: raw.title.unwrap_or_default(),
        descriptors: raw.formats.into_iter().filter_map(RawFormat::into_descriptor).collect(),
    })
}

/// One parsed `[download]` progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    pub percent: f32,
    pub speed_bytes: Option<u64>,
    pub eta_seconds: Option<u64>,
    pub current_size: Option<u64>,
    pub total_size: Option<u64>,
}

/// Parses progress from a yt-dlp output line.
/// Example: "[download]  45.2% of ~10.00MiB at 500.00KiB/s ETA 00:10"
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }

    let mut percent = None;
    let mut speed_bytes = None;
    let mut eta_seconds = None;
    let mut total_size = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        let next = parts.get(i + 1).copied();
        if let Some(p) = part.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
            percent = Some(p.clamp(0.0, 100.0));
        }
        match (*part, next) {
            // Estimated totals may be printed as "~  1.50GiB"
            ("of", Some("~")) => total_size = parts.get(i + 2).and_then(|size| parse_size(size)),
            ("of", Some(size)) => total_size = parse_size(size.trim_start_matches('~')),
            ("at", Some(speed)) => speed_bytes = parse_size(speed),
            ("ETA", Some(eta)) => eta_seconds = parse_eta(eta),
            _ => {}
        }
    }

    let percent = percent?;
    let current_size = total_size.map(|total| (total as f64 * f64::from(percent) / 100.0) as u64);
    Some(ProgressInfo {
        percent,
        speed_bytes,
        eta_seconds,
        current_size,
        total_size,
    })
}

/// Parses sizes like "10.00MiB", "500.00KiB/s" or "1.2GiB".
fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_end_matches("/s");
    let units: [(&str, f64); 4] = [
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("B", 1.0),
    ];
    units.iter().find_map(|(suffix, factor)| {
        let number = size_str.strip_suffix(suffix)?.parse::<f64>().ok()?;
        Some((number * factor) as u64)
    })
}

/// Parses "00:10", "1:23" or "1:02:03".
fn parse_eta(eta_str: &str) -> Option<u64> {
    eta_str
        .split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_progress_full_line() {
        let info = parse_progress("[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10").unwrap();
        assert!((info.percent - 45.2).abs() < 0.01);
        assert_eq!(info.total_size, Some(10 * 1024 * 1024));
        assert_eq!(info.speed_bytes, Some(500 * 1024));
        assert_eq!(info.eta_seconds, Some(10));
        assert_eq!(info.current_size, Some((10.0 * 1024.0 * 1024.0 * 0.452) as u64));
    }

    #[test]
    fn test_parse_progress_approximate_total() {
        let info = parse_progress("[download]   3.0% of ~  1.50GiB at  2.00MiB/s ETA 12:30").unwrap();
        assert_eq!(info.eta_seconds, Some(750));
        let total = (1.5 * 1024.0 * 1024.0 * 1024.0) as u64;
        assert_eq!(info.total_size, Some(total));
        assert_eq!(info.current_size, Some((total as f64 * 0.03) as u64));

        let info = parse_progress("[download]  50.0% of ~  1.00KiB at  2.00MiB/s ETA 00:01").unwrap();
        assert_eq!(info.total_size, Some(1024));
        assert_eq!(info.current_size, Some(512));

        let info = parse_progress("[download]   3.0% of ~1.50GiB at 2.00MiB/s ETA 1:02:03").unwrap();
        assert_eq!(info.total_size, Some((1.5 * 1024.0 * 1024.0 * 1024.0) as u64));
        assert_eq!(info.eta_seconds, Some(3723));
    }

    #[test]
    fn test_parse_progress_ignores_other_lines() {
        assert_eq!(parse_progress("[download] Destination: /tmp/x.mp4"), None);
        assert_eq!(parse_progress("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_progress("[download] Resuming download at byte 1024"), None);
    }

    #[test]
    fn test_parse_progress_clamps_percent() {
        let info = parse_progress("[download] 150.0% of 1.00KiB").unwrap();
        assert_eq!(info.percent, 100.0);
        assert_eq!(info.current_size, Some(1024));
    }

    fn descriptor_with_size(size: Option<u64>) -> StreamDescriptor {
        StreamDescriptor {
            id: "137".into(),
            media_kind: MediaKind::Video,
            height: Some(1080),
            approx_size_bytes: size,
            container_ext: "mp4".into(),
            bitrate_kbps: None,
        }
    }

    #[test]
    fn test_transfer_counts_fall_back_to_descriptor_size() {
        let info = parse_progress("[download]  25.0% at 1.00MiB/s ETA 00:03").unwrap();
        assert_eq!(info.total_size, None);

        assert_eq!(transfer_counts(&info, &descriptor_with_size(Some(4000))), (1000, Some(4000)));
        assert_eq!(transfer_counts(&info, &descriptor_with_size(None)), (0, None));

        let reported = parse_progress("[download]  50.0% of 2.00KiB").unwrap();
        assert_eq!(
            transfer_counts(&reported, &descriptor_with_size(Some(4000))),
            (1024, Some(2048))
        );
    }

    #[test]
    fn test_parse_source_info_classifies_formats() {
        let json = br#"{
            "title": "Some Video",
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3400000},
                {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "filesize_approx": 52000000.0, "tbr": 4400.1},
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "filesize": null}
            ]
        }"#;

        let info = parse_source_info(json).unwrap();
        assert_eq!(info.title, "Some Video");
        let kinds: Vec<(&str, MediaKind)> = info.descriptors.iter().map(|d| (d.id.as_str(), d.media_kind)).collect();
        assert_eq!(
            kinds,
            vec![("140", MediaKind::Audio), ("137", MediaKind::Video), ("18", MediaKind::Muxed)]
        );

        let audio = &info.descriptors[0];
        assert_eq!(audio.bitrate_kbps, Some(129.5));
        assert_eq!(audio.approx_size_bytes, Some(3_400_000));
        assert_eq!(audio.height, None);

        let video = &info.descriptors[1];
        assert_eq!(video.height, Some(1080));
        assert_eq!(video.approx_size_bytes, Some(52_000_000));
        assert_eq!(video.container_ext, "mp4");

        assert_eq!(info.descriptors[2].approx_size_bytes, None);
    }

    #[test]
    fn test_parse_source_info_tolerates_missing_fields() {
        let info = parse_source_info(br#"{"formats": [{"format_id": "0"}]}"#).unwrap();
        assert_eq!(info.title, "");
        assert_eq!(info.descriptors[0].media_kind, MediaKind::Muxed);
        assert_eq!(info.descriptors[0].container_ext, "");
    }

    #[test]
    fn test_parse_source_info_rejects_garbage() {
        let err = parse_source_info(b"not json").unwrap_err();
        assert!(matches!(err, DownloadError::TransferError(_)));
    }

    #[test]
    fn test_capabilities_reflect_proxy() {
        let plain = YtDlpProvider::new("yt-dlp", None);
        assert!(!plain.capabilities().proxy);
        assert!(plain.capabilities().reports_totals);

        let proxied = YtDlpProvider::new("yt-dlp", Some("socks5://127.0.0.1:1080".to_string()));
        assert!(proxied.capabilities().proxy);
    }

    #[tokio::test]
    async fn test_missing_binary_is_transfer_error() {
        let provider = YtDlpProvider::new("/nonexistent/yt-dlp-binary", None);
        let url = Url::parse("https://example.com/watch?v=x").unwrap();
        let err = provider.list_descriptors(&url).await.unwrap_err();
        assert!(matches!(err, DownloadError::TransferError(ref m) if m.contains("not found")));
    }
}
