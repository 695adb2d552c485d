use std::fmt;
use thiserror::Error;

/// Structured error type for a single download attempt.
///
/// Every variant carries a human-readable detail string that is forwarded to the
/// caller together with the [`ErrorKind`] when a URL ends in a terminal failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Malformed or unsupported URL
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// Source reports the content missing, private or region-blocked
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    /// No descriptor of the required kind exists
    #[error("no stream available: {0}")]
    NoStreamAvailable(String),
    /// Network or provider failure during a fetch
    #[error("transfer failed: {0}")]
    TransferError(String),
    /// The merge tool is not installed or not runnable
    #[error("merge tool unavailable: {0}")]
    MergeUnavailable(String),
    /// The merge tool exited with a failure
    #[error("merge failed: {0}")]
    MergeFailed(String),
    /// Local filesystem failure (destination, rename, name reservation)
    #[error("filesystem error: {0}")]
    Filesystem(String),
    /// User-initiated cancellation
    #[error("cancelled")]
    Cancelled,
}

/// Copyable discriminant of [`DownloadError`], used in outcomes and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidReference,
    SourceUnavailable,
    NoStreamAvailable,
    TransferError,
    MergeUnavailable,
    MergeFailed,
    Filesystem,
    Cancelled,
}

impl ErrorKind {
    /// Stable label for logs and the CLI summary
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidReference => "invalid_reference",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::NoStreamAvailable => "no_stream_available",
            ErrorKind::TransferError => "transfer_error",
            ErrorKind::MergeUnavailable => "merge_unavailable",
            ErrorKind::MergeFailed => "merge_failed",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::InvalidReference(_) => ErrorKind::InvalidReference,
            DownloadError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            DownloadError::NoStreamAvailable(_) => ErrorKind::NoStreamAvailable,
            DownloadError::TransferError(_) => ErrorKind::TransferError,
            DownloadError::MergeUnavailable(_) => ErrorKind::MergeUnavailable,
            DownloadError::MergeFailed(_) => ErrorKind::MergeFailed,
            DownloadError::Filesystem(_) => ErrorKind::Filesystem,
            DownloadError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns the inner detail message
    pub fn message(&self) -> &str {
        match self {
            DownloadError::InvalidReference(msg)
            | DownloadError::SourceUnavailable(msg)
            | DownloadError::NoStreamAvailable(msg)
            | DownloadError::TransferError(msg)
            | DownloadError::MergeUnavailable(msg)
            | DownloadError::MergeFailed(msg)
            | DownloadError::Filesystem(msg) => msg,
            DownloadError::Cancelled => "cancelled by user",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Filesystem(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_display() {
        let err = DownloadError::TransferError("connection reset".into());
        assert_eq!(err.to_string(), "transfer failed: connection reset");
        assert_eq!(DownloadError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(DownloadError::MergeFailed("".into()).kind().as_str(), "merge_failed");
        assert_eq!(DownloadError::NoStreamAvailable("".into()).kind(), ErrorKind::NoStreamAvailable);
        assert_eq!(ErrorKind::InvalidReference.to_string(), "invalid_reference");
    }

    #[test]
    fn test_message_and_io_conversion() {
        let err: DownloadError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(err.message(), "denied");
    }
}
