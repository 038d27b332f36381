use serde::{Deserialize, Serialize};

use crate::common::types::{ItemId, ProviderId};
use crate::model::stream_details::{ContentType, Quality, SourceKind, StreamDetails};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Track,
    Radio,
}

/// One candidate provider for a queue item, ordered by descending quality
/// in `QueueItem.provider_list` (spec §3, §4.1 "Provider selection").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMapping {
    pub provider_id: ProviderId,
    pub quality: Quality,
    pub content_type: ContentType,
    pub source_kind: SourceKind,
    pub source_location: String,
}

/// spec §3 `QueueItem` — what the mixer asks the queue for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: ItemId,
    pub name: String,
    /// Ordered candidates by descending quality.
    pub provider_list: Vec<ProviderMapping>,
    pub media_type: MediaType,
    /// Corrected by the mixer when the item ends (spec §4.2 "Duration correction").
    pub duration: f64,
    /// Populated once playback starts.
    pub streamdetails: Option<StreamDetails>,
}

impl QueueItem {
    pub fn sorted_providers(&self) -> Vec<&ProviderMapping> {
        let mut list: Vec<&ProviderMapping> = self.provider_list.iter().collect();
        list.sort_by(|a, b| b.quality.cmp(&a.quality));
        list
    }
}
