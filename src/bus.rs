//! Crate-wide event bus. spec §4.1: `STREAM_STARTED` / `STREAM_ENDED`, plus
//! the progress/metadata push that §4.5 and §4.7 rely on.
//!
//! A single `tokio::sync::broadcast` channel; lagging subscribers (the DACP
//! server, an HTTP long-poll, whatever future consumer) just miss old events
//! rather than backpressuring the pipeline.

use tokio::sync::broadcast;

use crate::common::types::{ItemId, PlayerId, StreamSessionId};

#[derive(Debug, Clone)]
pub enum StreamEvent {
    StreamStarted {
        session_id: StreamSessionId,
        item_id: ItemId,
    },
    StreamEnded {
        session_id: StreamSessionId,
        item_id: ItemId,
        corrected_duration: f64,
    },
    Progress {
        player_id: PlayerId,
        elapsed_seconds: f64,
    },
    VolumeChanged {
        player_id: PlayerId,
        volume: u8,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// No-op if nobody is listening — every caller treats this as fire-and-forget.
    pub fn publish(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
