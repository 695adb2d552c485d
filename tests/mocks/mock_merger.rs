//! Mock merge tool that concatenates its inputs

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tubebatch::download::{DownloadError, MergeTool};

#[derive(Debug, Clone, PartialEq)]
pub enum MergeMode {
    Succeed,
    Unavailable,
    /// Writes a partial output, then fails with this stderr
    Fail(String),
    /// Writes a partial output and takes this long before succeeding
    Slow(Duration),
}

pub struct MockMerger {
    mode: MergeMode,
    calls: AtomicU32,
}

impl MockMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MergeTool for MockMerger {
    fn name(&self) -> &str {
        "mock-merger"
    }

    async fn is_available(&self) -> bool {
        self.mode != MergeMode::Unavailable
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            MergeMode::Unavailable => Err(DownloadError::MergeUnavailable("'ffmpeg' not found".to_string())),
            MergeMode::Fail(stderr) => {
                tokio::fs::write(output, b"partial").await?;
                Err(DownloadError::MergeFailed(stderr.clone()))
            }
            MergeMode::Slow(delay) => {
                tokio::fs::write(output, b"partial").await?;
                tokio::time::sleep(*delay).await;
                concat(video, audio, output).await
            }
            MergeMode::Succeed => concat(video, audio, output).await,
        }
    }
}

async fn concat(video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
    let mut merged = tokio::fs::read(video).await?;
    merged.extend(tokio::fs::read(audio).await?);
    tokio::fs::write(output, merged).await?;
    Ok(())
}
