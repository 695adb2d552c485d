use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

use crate::download::types::{MediaType, Quality};

#[derive(Parser, Debug)]
#[command(name = "tubebatch")]
#[command(author, version, about = "Concurrent batch downloader for online video and audio", long_about = None)]
pub struct Cli {
    /// Log at debug level on the terminal
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more URLs
    Download {
        /// URLs to download
        urls: Vec<String>,

        /// Read additional URLs from a file (one per line, `#` starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Quality tier: highest, 4k, 2k, 1080p, 720p, 480p, 360p
        #[arg(short, long)]
        quality: Option<Quality>,

        /// Media type: audio, video, audio+video
        #[arg(short = 't', long = "type")]
        media_type: Option<MediaType>,

        /// Maximum number of concurrent downloads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Destination directory (overrides DOWNLOAD_FOLDER)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the streams a URL offers and what would be picked
    Formats {
        url: String,

        /// Print the raw descriptor list as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses a URL list: one URL per line, blank lines and `#` comments skipped.
pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_url_file(path: &Path) -> io::Result<Vec<String>> {
    Ok(parse_url_list(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_command() {
        let cli = Cli::try_parse_from([
            "tubebatch",
            "download",
            "-q",
            "720p",
            "--type",
            "audio",
            "-w",
            "5",
            "https://a.example/1",
            "https://a.example/2",
        ])
        .unwrap();

        match cli.command {
            Commands::Download {
                urls,
                quality,
                media_type,
                workers,
                file,
                output,
            } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(quality, Some(Quality::P720));
                assert_eq!(media_type, Some(MediaType::AudioOnly));
                assert_eq!(workers, Some(5));
                assert!(file.is_none());
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_quality() {
        assert!(Cli::try_parse_from(["tubebatch", "download", "-q", "8k", "https://a.example/1"]).is_err());
    }

    #[test]
    fn test_formats_command_with_global_verbose() {
        let cli = Cli::try_parse_from(["tubebatch", "formats", "https://a.example/1", "--json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Formats { json: true, .. }));
    }

    #[test]
    fn test_parse_url_list() {
        let content = "# watch later\nhttps://a.example/1\n\n   https://a.example/2  \n#https://skipped\n";
        assert_eq!(parse_url_list(content), vec!["https://a.example/1", "https://a.example/2"]);
    }
}
