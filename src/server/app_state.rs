use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::EventBus;
use crate::common::types::PlayerId;
use crate::configs::base::Config;
use crate::loudness::LoudnessAnalyser;
use crate::model::PlayerEndpoint;
use crate::queue::Queue;

/// Top-level application state shared across the HTTP stream endpoint, the
/// DACP control server, and the group coordinator.
pub struct AppState {
    pub start_time: std::time::Instant,
    pub players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
    pub queue: Arc<dyn Queue>,
    pub bus: EventBus,
    pub loudness: Arc<LoudnessAnalyser>,
    pub config: Config,
}

pub fn now_ms() -> u64 {
    crate::common::types::now_ms()
}
