use serde::{Deserialize, Serialize};

use crate::common::types::{ItemId, ProviderId};

/// Ordinal quality tiers. Ordering matters: provider selection walks
/// `QueueItem.provider_list` in descending order, and the downsample
/// thresholds in spec §4.1 compare against these tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Normal,
    High,
    Lossless,
    HiRes1,
    HiRes2,
    HiRes3,
}

impl Quality {
    /// Downsample clamp table, spec §4.1: each hi-res tier above the
    /// player's `max_sample_rate` threshold is clamped to its ceiling rate.
    /// Tiers at or below `HiRes1` need no clamp beyond the session's
    /// negotiated sample rate.
    pub fn downsample_clamp(self) -> Option<u32> {
        match self {
            Quality::HiRes3 => Some(192_000),
            Quality::HiRes2 => Some(96_000),
            Quality::HiRes1 => Some(48_000),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    FilePath,
    Url,
    ExecutableCommand,
}

/// Symbolic codec tag, spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Flac,
    Wav,
    Aac,
    Mp3,
    Ogg,
    PcmRaw,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Flac => "flac",
            ContentType::Wav => "wav",
            ContentType::Aac => "aac",
            ContentType::Mp3 => "mp3",
            ContentType::Ogg => "ogg",
            ContentType::PcmRaw => "pcm-raw",
            ContentType::Other(s) => s.as_str(),
        }
    }

    /// spec §4.1: aac takes a special decode-first route.
    pub fn needs_decode_stage(&self) -> bool {
        matches!(self, ContentType::Aac)
    }
}

/// spec §3 `StreamDetails` — immutable descriptor of how to obtain one
/// track's audio. Produced on demand by a provider, consumed once per
/// playback, never cached by the mixer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDetails {
    pub item_id: ItemId,
    pub provider_id: ProviderId,
    pub quality: Quality,
    pub content_type: ContentType,
    pub source_kind: SourceKind,
    pub source_location: String,
    pub stream_title: Option<String>,
}
