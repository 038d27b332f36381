//! Crossfade, spec §4.2 + §9 "Temp files for crossfade".
//!
//! Input: two equal-length PCM buffers, `fade_out` and `fade_in`, both
//! exactly `fade_bytes` long. The mixer's contract is the output — a
//! linear-in-time amplitude ramp mixed at unit gain — not the technique; we
//! use the same external SoX-compatible tool the pipeline already drives,
//! writing scratch input on a memory-backed temp dir and unlinking on every
//! exit path.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use uuid::Uuid;

use crate::common::errors::StreamError;
use crate::common::types::AnyResult;
use crate::model::format::AudioFormat;

struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub struct CrossfadeEngine {
    sox_bin: String,
    scratch_dir: PathBuf,
}

impl CrossfadeEngine {
    pub fn new(sox_bin: impl Into<String>) -> Self {
        Self {
            sox_bin: sox_bin.into(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Runs `sox` with `stdin_data` piped to it and no stdout capture — used
    /// for the two fade passes, each of which writes its result to a file.
    async fn run_to_file(&self, argv: &[String], stdin_data: &[u8]) -> AnyResult<()> {
        let mut command = Command::new(&self.sox_bin);
        command
            .args(argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| StreamError::HelperSpawnFailed(e.to_string()))?;
        {
            let mut stdin = child.stdin.take().expect("piped stdin");
            stdin.write_all(stdin_data).await?;
            stdin.shutdown().await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(StreamError::HelperExitedEarly("crossfade fade pass exited non-zero".into()).into());
        }
        Ok(())
    }

    /// Mixes `fade_out` (ramping to zero) against `fade_in` (ramping from
    /// zero) over `duration_s` seconds, returning a buffer of the same
    /// length as the inputs.
    ///
    /// Ported from the original's `__crossfade_pcm_parts`: SoX's `-m`
    /// combine mode takes effects only once, after both inputs, so it can't
    /// fade each input on its own — the fade has to happen in two prior
    /// passes, one per side, each writing a scratch file that the combine
    /// pass then mixes at unit gain.
    pub async fn mix(
        &self,
        fade_out: &[u8],
        fade_in: &[u8],
        format: &AudioFormat,
        duration_s: f64,
    ) -> AnyResult<Vec<u8>> {
        debug_assert_eq!(fade_out.len(), fade_in.len());

        let tag = Uuid::new_v4();
        let fadein_path = self.scratch_dir.join(format!("streamcore-xfade-in-{tag}.raw"));
        let fadeout_path = self.scratch_dir.join(format!("streamcore-xfade-out-{tag}.raw"));
        let _in_guard = TempFileGuard(fadein_path.clone());
        let _out_guard = TempFileGuard(fadeout_path.clone());

        let encoding = format.sox_encoding_args();
        let raw_type = vec!["-t".to_string(), "raw".to_string()];

        let mut fadein_argv: Vec<String> = vec!["--ignore-length".to_string()];
        fadein_argv.extend(raw_type.iter().cloned());
        fadein_argv.extend(encoding.iter().cloned());
        fadein_argv.push("-".to_string());
        fadein_argv.extend(raw_type.iter().cloned());
        fadein_argv.extend(encoding.iter().cloned());
        fadein_argv.push(fadein_path.to_string_lossy().into_owned());
        fadein_argv.push("fade".to_string());
        fadein_argv.push("t".to_string());
        fadein_argv.push(format!("{duration_s}"));
        self.run_to_file(&fadein_argv, fade_in).await?;

        let mut fadeout_argv: Vec<String> = vec!["--ignore-length".to_string()];
        fadeout_argv.extend(raw_type.iter().cloned());
        fadeout_argv.extend(encoding.iter().cloned());
        fadeout_argv.push("-".to_string());
        fadeout_argv.extend(raw_type.iter().cloned());
        fadeout_argv.extend(encoding.iter().cloned());
        fadeout_argv.push(fadeout_path.to_string_lossy().into_owned());
        fadeout_argv.push("reverse".to_string());
        fadeout_argv.push("fade".to_string());
        fadeout_argv.push("t".to_string());
        fadeout_argv.push(format!("{duration_s}"));
        fadeout_argv.push("reverse".to_string());
        self.run_to_file(&fadeout_argv, fade_out).await?;

        let mut combine_argv: Vec<String> = vec!["-m".to_string()];
        combine_argv.push("-v".to_string());
        combine_argv.push("1.0".to_string());
        combine_argv.extend(raw_type.iter().cloned());
        combine_argv.extend(encoding.iter().cloned());
        combine_argv.push(fadeout_path.to_string_lossy().into_owned());
        combine_argv.push("-v".to_string());
        combine_argv.push("1.0".to_string());
        combine_argv.extend(raw_type.iter().cloned());
        combine_argv.extend(encoding.iter().cloned());
        combine_argv.push(fadein_path.to_string_lossy().into_owned());
        combine_argv.extend(raw_type.iter().cloned());
        combine_argv.extend(encoding.iter().cloned());
        combine_argv.push("-".to_string());

        let mut command = Command::new(&self.sox_bin);
        command
            .args(&combine_argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| StreamError::HelperSpawnFailed(e.to_string()))?;
        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut mixed = Vec::with_capacity(fade_out.len());
        stdout.read_to_end(&mut mixed).await?;
        let status = child.wait().await?;
        if !status.success() {
            return Err(StreamError::HelperExitedEarly("crossfade combine exited non-zero".into()).into());
        }
        Ok(mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_paths_are_unique_per_call() {
        let engine = CrossfadeEngine::new("sox");
        let tag_a = Uuid::new_v4();
        let tag_b = Uuid::new_v4();
        assert_ne!(
            engine.scratch_dir.join(format!("streamcore-xfade-out-{tag_a}.raw")),
            engine.scratch_dir.join(format!("streamcore-xfade-out-{tag_b}.raw")),
        );
    }
}
