use serde::{Deserialize, Serialize};

use crate::common::types::PlayerId;

/// Static seed for the player registry. Endpoint discovery itself is out of
/// scope (spec §1 "Out of scope: the player registry"); this just lets a
/// config file describe the fixed set of RAOP endpoints to drive.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointConfig {
    pub player_id: PlayerId,
    pub address: String,
    #[serde(default)]
    pub md: Option<String>,
    #[serde(default)]
    pub et: Option<String>,
}
