use thiserror::Error;

use crate::download::error::DownloadError;

/// Application-level error type.
///
/// Download failures have their own taxonomy in [`DownloadError`]; this enum covers
/// everything around them (process plumbing, configuration, parsing) and wraps a
/// `DownloadError` when one has to travel through application code.
///
/// # Example
///
/// ```no_run
/// use tubebatch::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Download errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// External process did not finish in time
    #[error("Process timed out after {0}s")]
    Timeout(u64),

    /// JSON decoding errors (yt-dlp dumps)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// True when the error means the binary could not be found at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
