//! Classification of yt-dlp failures.
//!
//! yt-dlp reports everything on stderr as free text, so the kind of failure has to be
//! recovered from known phrases. The result feeds the engine's error taxonomy.

use crate::core::process::{stderr_tail, STDERR_TAIL_CHARS};
use crate::download::error::DownloadError;

/// yt-dlp error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YtDlpErrorType {
    /// Video unavailable (private, removed, region restrictions)
    VideoUnavailable,
    /// The URL is malformed or no extractor handles it
    UnsupportedUrl,
    /// Network problems (timeouts, connection resets, DNS)
    NetworkError,
    /// YouTube flagged the request (403, sign-in walls)
    BotDetection,
    /// Unknown error
    Unknown,
}

/// Analyzes yt-dlp stderr and determines the error type
pub fn analyze_ytdlp_error(stderr: &str) -> YtDlpErrorType {
    let stderr_lower = stderr.to_lowercase();

    if stderr_lower.contains("private video")
        || stderr_lower.contains("video unavailable")
        || stderr_lower.contains("this video is not available")
        || stderr_lower.contains("video is private")
        || stderr_lower.contains("video has been removed")
        || stderr_lower.contains("this video does not exist")
        || stderr_lower.contains("available in your country")
        || stderr_lower.contains("blocked it in your country")
    {
        return YtDlpErrorType::VideoUnavailable;
    }

    if stderr_lower.contains("unsupported url")
        || stderr_lower.contains("is not a valid url")
        || stderr_lower.contains("incomplete youtube id")
    {
        return YtDlpErrorType::UnsupportedUrl;
    }

    if stderr_lower.contains("sign in to confirm you're not a bot")
        || stderr_lower.contains("http error 403")
        || stderr_lower.contains("http error 429")
    {
        return YtDlpErrorType::BotDetection;
    }

    if stderr_lower.contains("timed out")
        || stderr_lower.contains("timeout")
        || stderr_lower.contains("connection")
        || stderr_lower.contains("network")
        || stderr_lower.contains("temporary failure in name resolution")
    {
        return YtDlpErrorType::NetworkError;
    }

    YtDlpErrorType::Unknown
}

/// Maps a failed yt-dlp run onto the engine's error taxonomy.
///
/// Anything not recognized as unavailable content or a bad URL is a transfer error.
pub fn to_download_error(stderr: &[u8], exit_code: Option<i32>) -> DownloadError {
    let tail = stderr_tail(stderr, STDERR_TAIL_CHARS);
    let detail = if tail.is_empty() {
        format!("yt-dlp exited with status {:?}", exit_code)
    } else {
        tail
    };

    match analyze_ytdlp_error(&detail) {
        YtDlpErrorType::VideoUnavailable => DownloadError::SourceUnavailable(detail),
        YtDlpErrorType::UnsupportedUrl => DownloadError::InvalidReference(detail),
        YtDlpErrorType::NetworkError | YtDlpErrorType::BotDetection | YtDlpErrorType::Unknown => {
            DownloadError::TransferError(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::ErrorKind;

    #[test]
    fn test_analyze_unavailable() {
        assert_eq!(
            analyze_ytdlp_error("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            YtDlpErrorType::VideoUnavailable
        );
        assert_eq!(
            analyze_ytdlp_error("ERROR: The uploader has not made this video available in your country"),
            YtDlpErrorType::VideoUnavailable
        );
        assert_eq!(
            analyze_ytdlp_error("ERROR: Video unavailable. This video is not available"),
            YtDlpErrorType::VideoUnavailable
        );
    }

    #[test]
    fn test_analyze_unsupported_url() {
        assert_eq!(
            analyze_ytdlp_error("ERROR: Unsupported URL: https://example.com/"),
            YtDlpErrorType::UnsupportedUrl
        );
    }

    #[test]
    fn test_analyze_network() {
        assert_eq!(
            analyze_ytdlp_error("ERROR: unable to download video data: <urlopen error timed out>"),
            YtDlpErrorType::NetworkError
        );
        assert_eq!(
            analyze_ytdlp_error("ERROR: unable to download video data: HTTP Error 403: Forbidden"),
            YtDlpErrorType::BotDetection
        );
    }

    #[test]
    fn test_to_download_error_kinds() {
        assert_eq!(
            to_download_error(b"ERROR: Video unavailable", Some(1)).kind(),
            ErrorKind::SourceUnavailable
        );
        assert_eq!(
            to_download_error(b"ERROR: Unsupported URL: x", Some(1)).kind(),
            ErrorKind::InvalidReference
        );
        let err = to_download_error(b"", Some(2));
        assert_eq!(err.kind(), ErrorKind::TransferError);
        assert!(err.message().contains("Some(2)"));
    }
}
