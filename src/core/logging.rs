//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup summary of the external tools the engine relies on

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config::Settings;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
/// * `verbose` - Log at debug level instead of info
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str, verbose: bool) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    CombinedLogger::init(vec![
        TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Debug, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective settings at startup so misconfigured binaries show up early.
pub fn log_settings(settings: &Settings) {
    log::info!("Destination: {}", settings.destination_dir.display());
    log::info!(
        "Defaults: quality={} type={} workers={} attempts={}",
        settings.default_quality,
        settings.default_media_type,
        settings.max_concurrent_downloads,
        settings.max_attempts
    );
    log::info!("yt-dlp: {}", settings.ytdlp_bin);
    log::info!("ffmpeg: {}", settings.ffmpeg_bin);
    match settings.proxy {
        Some(ref proxy) => log::info!("Proxy: {}", proxy),
        None => log::debug!("Proxy: none"),
    }
}
