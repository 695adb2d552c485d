//! Request and descriptor types shared by the selector, the job and the providers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Requested quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Highest,
    Uhd4k,
    Qhd2k,
    P1080,
    P720,
    P480,
    P360,
}

impl Quality {
    /// Pixel height bound of the tier; `None` for `Highest`.
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Quality::Highest => None,
            Quality::Uhd4k => Some(2160),
            Quality::Qhd2k => Some(1440),
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Highest => "highest",
            Quality::Uhd4k => "4k",
            Quality::Qhd2k => "2k",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
        }
    }

    /// All tiers, best first.
    pub fn all() -> &'static [Self] {
        &[
            Quality::Highest,
            Quality::Uhd4k,
            Quality::Qhd2k,
            Quality::P1080,
            Quality::P720,
            Quality::P480,
            Quality::P360,
        ]
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "best" => Ok(Quality::Highest),
            "4k" | "2160p" => Ok(Quality::Uhd4k),
            "2k" | "1440p" => Ok(Quality::Qhd2k),
            "1080p" | "1080" => Ok(Quality::P1080),
            "720p" | "720" => Ok(Quality::P720),
            "480p" | "480" => Ok(Quality::P480),
            "360p" | "360" => Ok(Quality::P360),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

/// What the caller wants out of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    AudioOnly,
    VideoOnly,
    AudioAndVideo,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::AudioOnly => "audio",
            MediaType::VideoOnly => "video",
            MediaType::AudioAndVideo => "audio+video",
        }
    }

    pub fn all() -> &'static [Self] {
        &[MediaType::AudioOnly, MediaType::VideoOnly, MediaType::AudioAndVideo]
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" | "audio-only" => Ok(MediaType::AudioOnly),
            "video" | "video-only" => Ok(MediaType::VideoOnly),
            "audio+video" | "av" | "both" => Ok(MediaType::AudioAndVideo),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// One URL plus the policy to download it with. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: Quality,
    pub media_type: MediaType,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, quality: Quality, media_type: MediaType) -> Self {
        Self {
            url: url.into(),
            quality,
            media_type,
        }
    }
}

/// Which tracks a descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    Muxed,
}

/// A provider-reported representation of a media stream. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Provider handle for this representation (yt-dlp `format_id`)
    pub id: String,
    pub media_kind: MediaKind,
    pub height: Option<u32>,
    pub approx_size_bytes: Option<u64>,
    pub container_ext: String,
    /// Average bitrate; used to order audio-only descriptors
    pub bitrate_kbps: Option<f64>,
}

/// Everything a provider knows about a URL before downloading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub title: String,
    pub descriptors: Vec<StreamDescriptor>,
}
