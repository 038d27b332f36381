use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::types::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

/// spec §3 `PlayerEndpoint` — one network destination.
///
/// Invariant: `group_leader` is transitive of length at most 1 — a member's
/// `group_leader` never itself has a `group_leader` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEndpoint {
    pub player_id: PlayerId,
    pub address: String,
    pub discovery_props: HashMap<String, String>,
    pub volume: u8,
    pub state: PlayerState,
    pub group_leader: Option<PlayerId>,
    pub group_members: HashSet<PlayerId>,
    /// Playback position reported by the RAOP helper's stderr (spec §4.4),
    /// reset to 0 on "restarting w/o pause" and advanced on "... played".
    pub elapsed_ms: u64,
}

impl PlayerEndpoint {
    pub fn new(player_id: PlayerId, address: String) -> Self {
        Self {
            player_id,
            address,
            discovery_props: HashMap::new(),
            volume: 100,
            state: PlayerState::Idle,
            group_leader: None,
            group_members: HashSet::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_leader.is_some() || !self.group_members.is_empty()
    }
}
