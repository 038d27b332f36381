use std::collections::HashMap;

use crate::common::types::{AnyResult, PlayerId};
use crate::configs::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
    /// Per-player overrides keyed by `PlayerEndpoint.player_id`. Players
    /// without an entry get `PlayerConfig::default()`.
    #[serde(default)]
    pub players: HashMap<PlayerId, PlayerConfig>,
    /// Path to the SoX-compatible audio tool binary (spec §6).
    #[serde(default = "default_sox_bin")]
    pub sox_bin: String,
    /// Path to the RAOP client helper binary (spec §6, `cliraop`-shaped).
    #[serde(default = "default_raop_bin")]
    pub raop_bin: String,
    /// Path to the AAC decoder used by the two-stage decode route
    /// (SPEC_FULL §B.3).
    #[serde(default = "default_aac_decoder_bin")]
    pub aac_decoder_bin: String,
    /// Static player registry seed (endpoint discovery is out of scope).
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_str =
            std::fs::read_to_string("config.toml").unwrap_or_else(|_| "".to_string());
        if config_str.is_empty() {
            return Err("config.toml not found or empty".into());
        }
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn player_config(&self, player_id: &PlayerId) -> PlayerConfig {
        self.players.get(player_id).cloned().unwrap_or_default()
    }
}

fn default_sox_bin() -> String {
    "sox".to_string()
}

fn default_raop_bin() -> String {
    "cliraop".to_string()
}

fn default_aac_decoder_bin() -> String {
    "ffmpeg".to_string()
}
