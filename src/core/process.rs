//! Process execution utilities with timeout support
//!
//! Helpers for running the external tools (ffmpeg, yt-dlp) with timeouts so a hung
//! process cannot block a worker forever.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::core::error::AppError;

/// Default timeout for ffmpeg merges (10 minutes, long videos copy slowly on HDDs)
pub const FFMPEG_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for yt-dlp metadata dumps
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for `-version` availability probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of stderr characters attached to an error
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Run an async Command with a timeout.
///
/// Returns the process Output on success, or an AppError on timeout/IO failure.
/// The child is killed when the timeout elapses.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, AppError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(AppError::Io(e)),
        Err(_) => Err(AppError::Timeout(timeout.as_secs())),
    }
}

/// Returns the last `max_chars` characters of a process stream, lossily decoded.
pub fn stderr_tail(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
