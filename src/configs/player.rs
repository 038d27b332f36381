use serde::{Deserialize, Serialize};

/// Per-player configuration surface, spec §6.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    /// `Hz`. Out of `[44100, 384000]` or absent ⇒ mixer falls back to 96000.
    #[serde(default)]
    pub max_sample_rate: Option<u32>,
    #[serde(default)]
    pub crossfade_enabled: bool,
    /// Seconds, `[0, 30]`. Absent/zero ⇒ no pending crossfade tail is kept.
    #[serde(default = "default_crossfade_duration")]
    pub crossfade_duration: u32,
    /// Appended verbatim to the effects chain argv — never shell-parsed.
    #[serde(default)]
    pub extra_audio_effects: Option<String>,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u32,
    #[serde(default)]
    pub encryption: bool,
    #[serde(default)]
    pub alac_encode: bool,
    /// Milliseconds, `[-500, 500]`, subtracted from the base 2500ms offset.
    #[serde(default)]
    pub sync_adjust_ms: i32,
    #[serde(default)]
    pub device_password: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_sample_rate: None,
            crossfade_enabled: false,
            crossfade_duration: default_crossfade_duration(),
            extra_audio_effects: None,
            latency_ms: default_latency_ms(),
            encryption: false,
            alac_encode: false,
            sync_adjust_ms: 0,
            device_password: None,
            enabled: true,
        }
    }
}

impl PlayerConfig {
    /// Resolved session sample rate, spec §4.2 boundary behavior.
    pub fn resolved_sample_rate(&self) -> u32 {
        match self.max_sample_rate {
            Some(rate) if (44_100..=384_000).contains(&rate) => rate,
            _ => 96_000,
        }
    }

    pub fn resolved_crossfade_duration(&self) -> u32 {
        if self.crossfade_enabled {
            self.crossfade_duration.min(30)
        } else {
            0
        }
    }
}

fn default_crossfade_duration() -> u32 {
    6
}

fn default_latency_ms() -> u32 {
    2000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_sample_rate_falls_back_to_96000() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.resolved_sample_rate(), 96_000);
    }

    #[test]
    fn out_of_range_sample_rate_falls_back() {
        let mut cfg = PlayerConfig::default();
        cfg.max_sample_rate = Some(22_050);
        assert_eq!(cfg.resolved_sample_rate(), 96_000);
        cfg.max_sample_rate = Some(400_000);
        assert_eq!(cfg.resolved_sample_rate(), 96_000);
    }

    #[test]
    fn in_range_sample_rate_is_kept() {
        let mut cfg = PlayerConfig::default();
        cfg.max_sample_rate = Some(48_000);
        assert_eq!(cfg.resolved_sample_rate(), 48_000);
    }

    #[test]
    fn crossfade_disabled_yields_zero_duration() {
        let mut cfg = PlayerConfig::default();
        cfg.crossfade_enabled = false;
        cfg.crossfade_duration = 6;
        assert_eq!(cfg.resolved_crossfade_duration(), 0);
    }
}
