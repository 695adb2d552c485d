use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::AppError;
use crate::core::process::{FFMPEG_TIMEOUT, METADATA_TIMEOUT};
use crate::download::types::{MediaType, Quality};

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Cached ffmpeg binary path
/// Read from FFMPEG_BIN environment variable or defaults to "ffmpeg"
pub static FFMPEG_BIN: Lazy<String> = Lazy::new(|| env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()));

/// Optional proxy handed to yt-dlp (`--proxy`)
/// Read from YTDL_PROXY environment variable
pub static YTDL_PROXY: Lazy<Option<String>> =
    Lazy::new(|| env::var("YTDL_PROXY").ok().filter(|p| !p.trim().is_empty()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: tubebatch.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "tubebatch.log".to_string()));

/// Default download folder, tilde-expanded at load time
pub const DEFAULT_DOWNLOAD_FOLDER: &str = "~/Downloads/tubebatch";

/// Queue processing configuration
pub mod queue {
    /// Default maximum number of concurrent downloads
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;
}

/// Retry configuration
pub mod retry {
    use super::Duration;

    /// Attempts per URL, including the first one
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Unit multiplied by the jitter factor and attempt number
    pub const BACKOFF_UNIT_SECS: u64 = 1;

    pub fn backoff_unit() -> Duration {
        Duration::from_secs(BACKOFF_UNIT_SECS)
    }
}

/// Settings the engine consumes, read-only after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub destination_dir: PathBuf,
    pub default_quality: Quality,
    pub default_media_type: MediaType,
    pub max_concurrent_downloads: usize,
    pub max_attempts: u32,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub proxy: Option<String>,
    /// Limit for one `yt-dlp --dump-single-json` run
    pub metadata_timeout: Duration,
    /// Limit for one ffmpeg merge
    pub merge_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination_dir: expand_path(DEFAULT_DOWNLOAD_FOLDER),
            default_quality: Quality::P1080,
            default_media_type: MediaType::AudioAndVideo,
            max_concurrent_downloads: queue::MAX_CONCURRENT_DOWNLOADS,
            max_attempts: retry::MAX_ATTEMPTS,
            ytdlp_bin: YTDL_BIN.clone(),
            ffmpeg_bin: FFMPEG_BIN.clone(),
            proxy: YTDL_PROXY.clone(),
            metadata_timeout: METADATA_TIMEOUT,
            merge_timeout: FFMPEG_TIMEOUT,
        }
    }
}

impl Settings {
    /// Loads settings from the environment.
    ///
    /// Variables: DOWNLOAD_FOLDER, DEFAULT_QUALITY, DEFAULT_MEDIA_TYPE,
    /// MAX_CONCURRENT_DOWNLOADS, MAX_ATTEMPTS, METADATA_TIMEOUT_SECS, MERGE_TIMEOUT_SECS
    /// (plus the binary/proxy statics above).
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an injectable lookup, for tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(dir) = lookup("DOWNLOAD_FOLDER").filter(|d| !d.trim().is_empty()) {
            settings.destination_dir = expand_path(&dir);
        }
        if let Some(q) = lookup("DEFAULT_QUALITY") {
            settings.default_quality = q.parse().map_err(AppError::Config)?;
        }
        if let Some(t) = lookup("DEFAULT_MEDIA_TYPE") {
            settings.default_media_type = t.parse().map_err(AppError::Config)?;
        }
        if let Some(n) = lookup("MAX_CONCURRENT_DOWNLOADS") {
            settings.max_concurrent_downloads = parse_positive(&n, "MAX_CONCURRENT_DOWNLOADS")?;
        }
        if let Some(n) = lookup("MAX_ATTEMPTS") {
            settings.max_attempts = parse_positive(&n, "MAX_ATTEMPTS")?;
        }
        if let Some(n) = lookup("METADATA_TIMEOUT_SECS") {
            settings.metadata_timeout = Duration::from_secs(parse_positive(&n, "METADATA_TIMEOUT_SECS")?);
        }
        if let Some(n) = lookup("MERGE_TIMEOUT_SECS") {
            settings.merge_timeout = Duration::from_secs(parse_positive(&n, "MERGE_TIMEOUT_SECS")?);
        }

        Ok(settings)
    }
}

fn parse_positive<T>(raw: &str, key: &str) -> Result<T, AppError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(AppError::Config(format!("{} must be a positive integer, got '{}'", key, raw))),
    }
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
