use std::sync::Arc;

use dashmap::DashMap;

use crate::common::cancel::CancelToken;
use crate::common::types::{PlayerId, StreamSessionId};
use crate::delivery::DeliveryDriver;
use crate::model::format::AudioFormat;

/// spec §3 `StreamSession` — one live playback, possibly fanned out to a
/// sync group of delivery drivers.
///
/// Invariant: every delivery driver's `start_ntp` equals the session's;
/// a driver whose stamp differs is orphaned and skipped by fan-out.
pub struct StreamSession {
    pub session_id: StreamSessionId,
    pub leader_id: PlayerId,
    pub start_ntp: u64,
    pub pcm_format: AudioFormat,
    pub per_endpoint: DashMap<PlayerId, Arc<dyn DeliveryDriver>>,
    pub cancel: CancelToken,
}

impl StreamSession {
    pub fn new(leader_id: PlayerId, start_ntp: u64, pcm_format: AudioFormat) -> Self {
        Self {
            session_id: StreamSessionId::generate(),
            leader_id,
            start_ntp,
            pcm_format,
            per_endpoint: DashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Drivers whose `start_ntp` still matches the session (spec §4.5);
    /// an orphaned driver (stamp drifted after an internal restart) is
    /// skipped and removed.
    pub fn live_drivers(&self) -> Vec<Arc<dyn DeliveryDriver>> {
        let mut orphaned = Vec::new();
        let mut live = Vec::new();
        for entry in self.per_endpoint.iter() {
            if entry.value().start_ntp() == self.start_ntp {
                live.push(entry.value().clone());
            } else {
                orphaned.push(entry.key().clone());
            }
        }
        for key in orphaned {
            self.per_endpoint.remove(&key);
        }
        live
    }

    pub fn is_empty(&self) -> bool {
        self.per_endpoint.is_empty()
    }
}

/// spec §3 `CrossfadeBuffer` — per-session scratch state retained between
/// queue items while a crossfade tail awaits its next head.
#[derive(Default)]
pub struct CrossfadeBuffer {
    pub pending_tail: Option<Vec<u8>>,
    pub fade_bytes: usize,
}

impl CrossfadeBuffer {
    pub fn new(fade_bytes: usize) -> Self {
        Self {
            pending_tail: None,
            fade_bytes,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_tail.is_some()
    }

    pub fn clear(&mut self) {
        self.pending_tail = None;
    }
}
