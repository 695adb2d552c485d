//! Format selection: maps a (quality, media type) policy onto a provider's descriptors.
//!
//! Selection is deterministic and relaxes constraints instead of failing:
//! container + height bound → height bound → best of the required kind.
//! The only failure is a descriptor set with nothing of the required kind.

use std::cmp::Ordering;
use std::fmt;

use crate::download::error::DownloadError;
use crate::download::types::{MediaKind, MediaType, Quality, StreamDescriptor};

/// Container preferred for video and muxed output
pub const PREFERRED_VIDEO_CONTAINER: &str = "mp4";

/// Container preferred for audio tracks; it muxes into mp4 without re-encoding
pub const PREFERRED_AUDIO_CONTAINER: &str = "m4a";

/// Declarative filter + ordering produced by [`select_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRule {
    pub media_type: MediaType,
    /// `None` means no bound (highest quality)
    pub max_height: Option<u32>,
    pub preferred_container: &'static str,
}

/// What to fetch for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// One descriptor, saved as-is
    Single(StreamDescriptor),
    /// Separate tracks that have to be merged
    Pair { video: StreamDescriptor, audio: StreamDescriptor },
}

impl Selection {
    pub fn needs_merge(&self) -> bool {
        matches!(self, Selection::Pair { .. })
    }

    /// Descriptors in fetch order (video before audio).
    pub fn descriptors(&self) -> Vec<&StreamDescriptor> {
        match self {
            Selection::Single(d) => vec![d],
            Selection::Pair { video, audio } => vec![video, audio],
        }
    }
}

/// Builds the selection rule for a policy. Pure.
pub fn select_format(quality: Quality, media_type: MediaType) -> SelectionRule {
    SelectionRule {
        media_type,
        max_height: quality.max_height(),
        preferred_container: PREFERRED_VIDEO_CONTAINER,
    }
}

/// A video-carrying option: a video-only track (to be paired or not) or a muxed stream.
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    descriptor: &'a StreamDescriptor,
    paired: bool,
}

impl SelectionRule {
    /// Applies the rule to a provider's descriptor set.
    pub fn select(&self, descriptors: &[StreamDescriptor]) -> Result<Selection, DownloadError> {
        let of_kind = |kind: MediaKind| descriptors.iter().filter(move |d| d.media_kind == kind);

        match self.media_type {
            MediaType::AudioOnly => best_audio(of_kind(MediaKind::Audio))
                .cloned()
                .map(Selection::Single)
                .ok_or_else(|| DownloadError::NoStreamAvailable("no audio-only stream".to_string())),
            MediaType::VideoOnly => {
                let candidates: Vec<Candidate<'_>> = of_kind(MediaKind::Video)
                    .map(|descriptor| Candidate {
                        descriptor,
                        paired: false,
                    })
                    .collect();
                self.pick(&candidates)
                    .map(|c| Selection::Single(c.descriptor.clone()))
                    .ok_or_else(|| DownloadError::NoStreamAvailable("no video-only stream".to_string()))
            }
            MediaType::AudioAndVideo => {
                let audio = best_audio(of_kind(MediaKind::Audio));
                let mut candidates: Vec<Candidate<'_>> = Vec::new();
                if audio.is_some() {
                    candidates.extend(of_kind(MediaKind::Video).map(|descriptor| Candidate {
                        descriptor,
                        paired: true,
                    }));
                }
                candidates.extend(of_kind(MediaKind::Muxed).map(|descriptor| Candidate {
                    descriptor,
                    paired: false,
                }));

                match (self.pick(&candidates), audio) {
                    (Some(c), Some(audio)) if c.paired => Ok(Selection::Pair {
                        video: c.descriptor.clone(),
                        audio: audio.clone(),
                    }),
                    (Some(c), _) => Ok(Selection::Single(c.descriptor.clone())),
                    (None, _) => Err(DownloadError::NoStreamAvailable(
                        "no muxed stream and no video+audio pair".to_string(),
                    )),
                }
            }
        }
    }

    fn fits_height(&self, d: &StreamDescriptor) -> bool {
        match (self.max_height, d.height) {
            (Some(max), Some(h)) => h <= max,
            _ => true,
        }
    }

    fn container_matches(&self, d: &StreamDescriptor) -> bool {
        d.container_ext.eq_ignore_ascii_case(self.preferred_container)
    }

    /// Picks the best candidate of the first non-empty relaxation tier.
    fn pick<'a>(&self, candidates: &[Candidate<'a>]) -> Option<Candidate<'a>> {
        let tiers: [&dyn Fn(&Candidate<'a>) -> bool; 3] = [
            &|c| self.container_matches(c.descriptor) && self.fits_height(c.descriptor),
            &|c| self.fits_height(c.descriptor),
            &|_| true,
        ];

        for (tier, accept) in tiers.iter().enumerate() {
            let best = candidates
                .iter()
                .filter(|c| accept(c))
                .max_by(|a, b| self.rank(a, b))
                .copied();
            if let Some(best) = best {
                if tier > 0 {
                    log::debug!(
                        "Format selection relaxed to tier {} ({}), picked {}",
                        tier,
                        self,
                        best.descriptor.id
                    );
                }
                return Some(best);
            }
        }
        None
    }

    /// Higher height wins; then preferred container; then separate tracks over muxed;
    /// then size. Unknown heights rank below every known height.
    fn rank(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
        let key = |c: &Candidate<'_>| {
            (
                c.descriptor.height.map_or(0, |h| u64::from(h) + 1),
                self.container_matches(c.descriptor),
                c.paired,
                c.descriptor.approx_size_bytes.unwrap_or(0),
            )
        };
        key(a).cmp(&key(b))
    }
}

/// Best audio track: preferred container first, then any container. Within a tier the
/// highest bitrate wins, size as tiebreak.
fn best_audio<'a>(audios: impl Iterator<Item = &'a StreamDescriptor>) -> Option<&'a StreamDescriptor> {
    let by_bitrate = |a: &&StreamDescriptor, b: &&StreamDescriptor| {
        a.bitrate_kbps
            .unwrap_or(0.0)
            .total_cmp(&b.bitrate_kbps.unwrap_or(0.0))
            .then_with(|| a.approx_size_bytes.unwrap_or(0).cmp(&b.approx_size_bytes.unwrap_or(0)))
    };
    let audios: Vec<&StreamDescriptor> = audios.collect();
    audios
        .iter()
        .filter(|d| d.container_ext.eq_ignore_ascii_case(PREFERRED_AUDIO_CONTAINER))
        .max_by(|a, b| by_bitrate(a, b))
        .or_else(|| audios.iter().max_by(|a, b| by_bitrate(a, b)))
        .copied()
}

/// Renders the rule as the equivalent yt-dlp `--format` expression.
impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.max_height.map(|h| format!("[height<={h}]")).unwrap_or_default();
        let ext = format!("[ext={}]", self.preferred_container);
        match self.media_type {
            MediaType::AudioOnly => write!(f, "bestaudio[ext={PREFERRED_AUDIO_CONTAINER}]/bestaudio"),
            MediaType::VideoOnly => write!(f, "bestvideo{h}{ext}/bestvideo{h}/bestvideo"),
            MediaType::AudioAndVideo => write!(
                f,
                "bestvideo{h}{ext}+bestaudio/best{h}{ext}/bestvideo{h}+bestaudio/best{h}/bestvideo+bestaudio/best"
            ),
        }
    }
}
