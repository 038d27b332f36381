use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// DACP port range to pick a free port from, spec §4.7: `[39831, 49831]`.
    #[serde(default = "default_dacp_range")]
    pub dacp_port_range: (u16, u16),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8095,
            dacp_port_range: default_dacp_range(),
        }
    }
}

fn default_dacp_range() -> (u16, u16) {
    (39831, 49831)
}
