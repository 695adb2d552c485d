use anyhow::Result;
use dotenvy::dotenv;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::signal;
use url::Url;

use tubebatch::cli::{read_url_file, Cli, Commands};
use tubebatch::core::{config, init_logger, log_settings, Settings};
use tubebatch::download::{
    select_format, BatchEvent, DownloadRequest, Downloader, MediaType, MergeTool, Outcome, Quality, Selection,
    StreamProvider, YtDlpProvider,
};

/// Main entry point for the batch downloader
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, configuration) or if any URL
/// of a download batch failed.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    let cli = Cli::parse_args();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH, cli.verbose)?;

    let settings = Settings::from_env()?;
    log_settings(&settings);

    match cli.command {
        Commands::Download {
            urls,
            file,
            quality,
            media_type,
            workers,
            output,
        } => run_download(settings, urls, file, quality, media_type, workers, output).await,
        Commands::Formats { url, json } => run_formats(settings, url, json).await,
    }
}

async fn run_download(
    mut settings: Settings,
    mut urls: Vec<String>,
    file: Option<PathBuf>,
    quality: Option<Quality>,
    media_type: Option<MediaType>,
    workers: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = file {
        let listed = read_url_file(&path).map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        log::info!("Read {} URL(s) from {}", listed.len(), path.display());
        urls.extend(listed);
    }
    if urls.is_empty() {
        return Err(anyhow::anyhow!("No URLs given. Pass URLs as arguments or use --file."));
    }

    if let Some(dir) = output {
        settings.destination_dir = dir;
    }
    let quality = quality.unwrap_or(settings.default_quality);
    let media_type = media_type.unwrap_or(settings.default_media_type);
    let workers = workers.unwrap_or(settings.max_concurrent_downloads);

    let downloader = Downloader::from_settings(settings);
    if media_type == MediaType::AudioAndVideo && !downloader.merger().is_available().await {
        log::warn!(
            "{} is not available; downloads that need merging will fail",
            downloader.settings().ffmpeg_bin
        );
    }

    // Ctrl-C cancels every running and queued download
    let control = downloader.control();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling downloads");
            control.cancel();
        }
    });

    let requests: Vec<DownloadRequest> = urls
        .into_iter()
        .map(|url| DownloadRequest::new(url, quality, media_type))
        .collect();
    let total = requests.len();
    println!(
        "Downloading {} URL(s) as {} @ {} into {}",
        total,
        media_type,
        quality,
        downloader.destination_directory().display()
    );

    let mut handle = downloader.run_batch(requests, workers);
    let mut shown: HashMap<String, (u32, Option<String>)> = HashMap::new();
    let mut outcomes = Vec::with_capacity(total);

    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::Progress(p) => {
                // Print at most every 10% or on a status change
                let decile = (p.fraction * 10.0) as u32;
                let entry = shown.entry(p.url.clone()).or_insert((0, None));
                if decile > entry.0 || (p.status_text.is_some() && p.status_text != entry.1) {
                    println!(
                        "[{:>3.0}%] {} {}",
                        p.fraction * 100.0,
                        p.url,
                        p.status_text.as_deref().unwrap_or("")
                    );
                    *entry = (decile.max(entry.0), p.status_text);
                }
            }
            BatchEvent::Finished { url, outcome } => {
                match &outcome {
                    Outcome::Completed { path } => println!("✅ {} -> {}", url, path.display()),
                    Outcome::Cancelled => println!("⏹️ {} cancelled", url),
                    Outcome::Failed { kind, detail, attempts } => {
                        println!("❌ {} failed after {} attempt(s) [{}]: {}", url, attempts, kind, detail)
                    }
                }
                outcomes.push((url, outcome));
            }
        }
    }

    let completed = outcomes.iter().filter(|(_, o)| o.is_completed()).count();
    let failed = outcomes.iter().filter(|(_, o)| o.is_failed()).count();
    let cancelled = outcomes.len() - completed - failed;
    println!("\nDone: {} completed, {} failed, {} cancelled", completed, failed, cancelled);
    log::info!(
        "Batch finished: {} completed, {} failed, {} cancelled",
        completed,
        failed,
        cancelled
    );

    if failed > 0 {
        return Err(anyhow::anyhow!("{} of {} download(s) failed", failed, total));
    }
    Ok(())
}

async fn run_formats(settings: Settings, url: String, json: bool) -> Result<()> {
    let url = Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", url, e))?;
    let provider = YtDlpProvider::from_settings(&settings);
    let info = provider.list_descriptors(&url).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.title);
    println!("{:<12} {:<7} {:<6} {:>7} {:>12} {:>9}", "ID", "KIND", "EXT", "HEIGHT", "SIZE", "KBPS");
    for d in &info.descriptors {
        println!(
            "{:<12} {:<7} {:<6} {:>7} {:>12} {:>9}",
            d.id,
            format!("{:?}", d.media_kind).to_lowercase(),
            d.container_ext,
            d.height.map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            d.approx_size_bytes.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            d.bitrate_kbps.map(|b| format!("{:.0}", b)).unwrap_or_else(|| "-".into()),
        );
    }

    let rule = select_format(settings.default_quality, settings.default_media_type);
    match rule.select(&info.descriptors) {
        Ok(Selection::Single(d)) => println!("\nPick for {}: {}", rule, d.id),
        Ok(Selection::Pair { video, audio }) => println!("\nPick for {}: {}+{}", rule, video.id, audio.id),
        Err(e) => println!("\nNothing matches {}: {}", rule, e),
    }
    Ok(())
}
