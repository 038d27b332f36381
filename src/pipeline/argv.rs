//! Effects-chain argv assembly, spec §4.1 + REDESIGN FLAG "Shell command
//! construction": the source interpolates a SoX command string; we build an
//! argument vector directly and never touch a shell.

use crate::model::format::AudioFormat;
use crate::model::stream_details::{ContentType, Quality};

/// One resolved stage of the effects chain, in apply order.
#[derive(Debug, Clone)]
pub struct EffectsPlan {
    pub input_args: Vec<String>,
    pub output_args: Vec<String>,
    pub effect_args: Vec<String>,
}

impl EffectsPlan {
    /// Full argv for the external SoX-compatible tool: input selector,
    /// `-` (stdin) or a path/URL, output selector, `-` (stdout), then effects.
    pub fn build_argv(&self, input_source: &str, stdin_input: bool) -> Vec<String> {
        let mut argv = Vec::new();
        argv.extend(self.input_args.iter().cloned());
        argv.push(if stdin_input {
            "-".to_string()
        } else {
            input_source.to_string()
        });
        argv.extend(self.output_args.iter().cloned());
        argv.push("-".to_string());
        argv.extend(self.effect_args.iter().cloned());
        argv
    }
}

/// spec §4.1 "Effects chain assembly". `gain_correct_db` is looked up by the
/// caller from a per-player table keyed by `(player_id, provider, item_id)`;
/// `0.0` means no correction stage is emitted.
pub struct EffectsRequest<'a> {
    pub content_type: &'a ContentType,
    pub quality: Quality,
    pub target_format: &'a AudioFormat,
    pub resample_requested: bool,
    pub gain_correct_db: f64,
    pub extra_effects: Option<&'a str>,
}

pub fn plan_effects(req: &EffectsRequest) -> EffectsPlan {
    let input_args = input_selector_args(req.content_type);
    let output_args = req.target_format.sox_encoding_args();

    let mut effect_args = Vec::new();

    if req.gain_correct_db.abs() > f64::EPSILON {
        effect_args.push("vol".to_string());
        effect_args.push(format!("{:.3}dB", req.gain_correct_db));
    }

    let clamp = req.quality.downsample_clamp();
    let target_rate = if req.resample_requested {
        Some(req.target_format.sample_rate)
    } else {
        clamp.filter(|&rate| rate < req.target_format.sample_rate)
    };
    if let Some(rate) = target_rate {
        effect_args.push("rate".to_string());
        effect_args.push("-v".to_string());
        effect_args.push(rate.to_string());
    }

    if let Some(extra) = req.extra_effects {
        effect_args.extend(split_extra_effects(extra));
    }

    EffectsPlan {
        input_args,
        output_args,
        effect_args,
    }
}

pub(crate) fn input_selector_args(content_type: &ContentType) -> Vec<String> {
    match content_type {
        ContentType::Flac => vec!["-t".to_string(), "flac".to_string()],
        ContentType::Wav => vec!["-t".to_string(), "wav".to_string()],
        ContentType::Mp3 => vec!["-t".to_string(), "mp3".to_string()],
        ContentType::Ogg => vec!["-t".to_string(), "ogg".to_string()],
        ContentType::PcmRaw => vec!["-t".to_string(), "raw".to_string()],
        // AAC is normalised by a separate decode stage (§4.1) before it ever
        // reaches this tool; by the time we build this argv it looks like WAV.
        ContentType::Aac => vec!["-t".to_string(), "wav".to_string()],
        ContentType::Other(tag) => vec!["-t".to_string(), tag.clone()],
    }
}

/// Splits a per-player extra-effects string on whitespace into tokens.
/// REDESIGN FLAG: reject any token containing shell metacharacters rather
/// than handing the whole string to a shell — this is config, not code, but
/// it still becomes part of an argv we control.
fn split_extra_effects(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .filter(|tok| !tok.chars().any(is_shell_metacharacter))
        .map(|tok| tok.to_string())
        .collect()
}

fn is_shell_metacharacter(c: char) -> bool {
    matches!(
        c,
        ';' | '|' | '&' | '$' | '`' | '>' | '<' | '\n' | '\\' | '"' | '\''
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> AudioFormat {
        AudioFormat::RAOP
    }

    #[test]
    fn no_gain_correction_emits_no_vol_stage() {
        let req = EffectsRequest {
            content_type: &ContentType::Flac,
            quality: Quality::Lossless,
            target_format: &fmt(),
            resample_requested: false,
            gain_correct_db: 0.0,
            extra_effects: None,
        };
        let plan = plan_effects(&req);
        assert!(!plan.effect_args.contains(&"vol".to_string()));
    }

    #[test]
    fn gain_correction_appends_vol_db_stage() {
        let req = EffectsRequest {
            content_type: &ContentType::Flac,
            quality: Quality::Lossless,
            target_format: &fmt(),
            resample_requested: false,
            gain_correct_db: -3.5,
            extra_effects: None,
        };
        let plan = plan_effects(&req);
        let idx = plan.effect_args.iter().position(|a| a == "vol").unwrap();
        assert_eq!(plan.effect_args[idx + 1], "-3.500dB");
    }

    #[test]
    fn hires3_above_threshold_downsamples_to_192000() {
        let req = EffectsRequest {
            content_type: &ContentType::Flac,
            quality: Quality::HiRes3,
            target_format: &fmt(),
            resample_requested: false,
            gain_correct_db: 0.0,
            extra_effects: None,
        };
        let plan = plan_effects(&req);
        let idx = plan.effect_args.iter().position(|a| a == "rate").unwrap();
        assert_eq!(plan.effect_args[idx + 1], "-v");
        assert_eq!(plan.effect_args[idx + 2], "192000");
    }

    #[test]
    fn extra_effects_with_metacharacters_are_dropped() {
        let req = EffectsRequest {
            content_type: &ContentType::Flac,
            quality: Quality::Lossless,
            target_format: &fmt(),
            resample_requested: false,
            gain_correct_db: 0.0,
            extra_effects: Some("fade t 0 3 2; rm -rf /"),
        };
        let plan = plan_effects(&req);
        assert!(!plan.effect_args.iter().any(|a| a.contains(';')));
    }
}
