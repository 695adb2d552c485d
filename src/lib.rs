//! Tubebatch - concurrent batch downloader for online video and audio
//!
//! This library drives an external stream provider (yt-dlp) and merge tool (ffmpeg)
//! to download many URLs at once, picking the best stream for a requested quality
//! and media type, retrying failures and honoring pause/resume/cancel.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, retry policy and filename helpers
//! - `download`: Format selection, the per-URL state machine and the batch coordinator
//! - `cli`: Command-line interface of the `tubebatch` binary

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod core;
pub mod download;

// Re-export commonly used types for convenience
pub use core::{config, AppError, Settings};
pub use download::{
    BatchEvent, BatchHandle, DownloadControl, DownloadError, DownloadRequest, Downloader, MediaType, Outcome,
    Quality,
};
