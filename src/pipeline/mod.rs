//! Audio source pipeline, spec §4.1.
//!
//! Spawns a decoder+effects chain per queue item and yields PCM chunks in
//! `target_format`. Every chunk but the last is exactly `chunk_size` bytes;
//! the producer always emits a final `is_last = true` chunk, even on
//! failure, so the mixer never blocks waiting for one.

pub mod argv;

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::bus::{EventBus, StreamEvent};
use crate::common::cancel::CancelToken;
use crate::common::types::{AnyResult, PlayerId, StreamSessionId};
use crate::configs::player::PlayerConfig;
use crate::loudness::LoudnessAnalyser;
use crate::model::format::AudioFormat;
use crate::model::queue_item::{MediaType, ProviderMapping, QueueItem};
use crate::model::stream_details::{ContentType, StreamDetails};
use argv::{EffectsRequest, input_selector_args, plan_effects};

/// One PCM chunk read from the effects chain's stdout.
pub struct Chunk {
    pub bytes: Vec<u8>,
    pub is_last: bool,
}

pub struct PipelineConfig<'a> {
    pub sox_bin: &'a str,
    pub aac_decoder_bin: &'a str,
    pub chunk_size: usize,
    pub target_format: AudioFormat,
    pub resample_requested: bool,
    pub player_config: &'a PlayerConfig,
}

/// RAII guard for the intermediate wav written by the AAC decode stage
/// (SPEC_FULL §B.3) — unlinked on every exit path.
struct DecodedScratchFile(std::path::PathBuf);

impl Drop for DecodedScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Runs the pipeline for one queue item end-to-end, sending each produced
/// chunk down `tx` (spec §9: message-passing between the cooperative
/// control plane and worker-pool blocking I/O, never a shared mutable
/// object). Returns once the terminal chunk has been sent.
pub async fn run_item(
    item: &QueueItem,
    session_id: StreamSessionId,
    player_id: &PlayerId,
    cancel: &CancelToken,
    cfg: &PipelineConfig<'_>,
    bus: &EventBus,
    loudness: &Arc<LoudnessAnalyser>,
    tx: flume::Sender<Chunk>,
) -> AnyResult<()> {
    let Some((mapping, details)) = select_provider(item) else {
        warn!(item_id = %item.item_id, "no provider available, emitting empty terminal chunk");
        let _ = tx
            .send_async(Chunk {
                bytes: Vec::new(),
                is_last: true,
            })
            .await;
        return Ok(());
    };

    bus.publish(StreamEvent::StreamStarted {
        session_id,
        item_id: item.item_id.clone(),
    });

    if item.media_type == MediaType::Track {
        loudness.schedule(item.item_id.clone(), mapping.provider_id.clone());
        spawn_loudness_scan(loudness.clone(), details.clone(), cfg.sox_bin.to_string());
    }

    let result = drive_helper(&mapping, &details, cancel, cfg, &tx).await;

    let _ = player_id;
    result
}

const LOUDNESS_SAMPLE_RATE: u32 = 48_000;
const LOUDNESS_CHANNELS: u32 = 2;

/// Fires the off-path EBU R128 scan (spec §4.6) in the background so it
/// never delays a chunk. Only runs for sources the analyser can safely
/// re-fetch on its own schedule — an `ExecutableCommand` source may have
/// side effects or be a one-shot stream, so it's left to the in-flight
/// marker set by `schedule` without ever completing.
fn spawn_loudness_scan(loudness: Arc<LoudnessAnalyser>, details: StreamDetails, sox_bin: String) {
    if !LoudnessAnalyser::source_is_refetchable(details.source_kind) {
        return;
    }
    tokio::spawn(async move {
        match decode_to_f32_pcm(&sox_bin, &details).await {
            Ok((samples, sample_rate, channels)) => {
                loudness.analyse_and_store(details, samples, sample_rate, channels).await;
            }
            Err(e) => {
                warn!(error = %e, item_id = %details.item_id, "loudness decode stage failed");
            }
        }
    });
}

/// Re-decodes `details.source_location` to interleaved float32 PCM,
/// independent of the streaming helper already driving playback.
async fn decode_to_f32_pcm(sox_bin: &str, details: &StreamDetails) -> AnyResult<(Vec<f32>, u32, u32)> {
    let mut argv = input_selector_args(&details.content_type);
    argv.push(details.source_location.clone());
    argv.extend([
        "-t".to_string(),
        "raw".to_string(),
        "-b".to_string(),
        "32".to_string(),
        "-e".to_string(),
        "floating-point".to_string(),
        "-c".to_string(),
        LOUDNESS_CHANNELS.to_string(),
        "-r".to_string(),
        LOUDNESS_SAMPLE_RATE.to_string(),
        "-".to_string(),
    ]);

    let mut command = Command::new(sox_bin);
    command
        .args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| crate::common::errors::StreamError::HelperSpawnFailed(e.to_string()))?;
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut raw = Vec::new();
    stdout.read_to_end(&mut raw).await?;
    let status = child.wait().await?;
    if !status.success() {
        return Err(crate::common::errors::StreamError::HelperExitedEarly(
            "loudness decode exited non-zero".to_string(),
        )
        .into());
    }

    let samples = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((samples, LOUDNESS_SAMPLE_RATE, LOUDNESS_CHANNELS))
}

fn select_provider(item: &QueueItem) -> Option<(ProviderMapping, StreamDetails)> {
    for mapping in item.sorted_providers() {
        let details = StreamDetails {
            item_id: item.item_id.clone(),
            provider_id: mapping.provider_id.clone(),
            quality: mapping.quality,
            content_type: mapping.content_type.clone(),
            source_kind: mapping.source_kind,
            source_location: mapping.source_location.clone(),
            stream_title: None,
        };
        return Some((mapping.clone(), details));
    }
    None
}

async fn drive_helper(
    mapping: &ProviderMapping,
    details: &StreamDetails,
    cancel: &CancelToken,
    cfg: &PipelineConfig<'_>,
    tx: &flume::Sender<Chunk>,
) -> AnyResult<()> {
    let req = EffectsRequest {
        content_type: &details.content_type,
        quality: details.quality,
        target_format: &cfg.target_format,
        resample_requested: cfg.resample_requested,
        gain_correct_db: 0.0,
        extra_effects: cfg.player_config.extra_audio_effects.as_deref(),
    };
    let plan = plan_effects(&req);

    let mut stdin_input = matches!(
        details.source_kind,
        crate::model::stream_details::SourceKind::ExecutableCommand
    );
    let mut source_location = details.source_location.clone();
    let mut decoded_guard: Option<DecodedScratchFile> = None;

    if content_type_needs_decode(&details.content_type) {
        match decode_aac_to_wav(cfg.aac_decoder_bin, &details.source_location).await {
            Ok(wav_bytes) => {
                let scratch = std::env::temp_dir()
                    .join(format!("streamcore-decode-{}.wav", uuid::Uuid::new_v4()));
                if std::fs::write(&scratch, &wav_bytes).is_ok() {
                    source_location = scratch.to_string_lossy().into_owned();
                    stdin_input = false;
                    decoded_guard = Some(DecodedScratchFile(scratch));
                }
            }
            Err(e) => {
                warn!(error = %e, "aac decode stage failed, falling back to direct input");
            }
        }
    }

    let argv = plan.build_argv(&source_location, stdin_input);

    let mut command = Command::new(cfg.sox_bin);
    command
        .args(&argv)
        .stdin(if stdin_input {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to spawn audio tool");
            let _ = tx
                .send_async(Chunk {
                    bytes: Vec::new(),
                    is_last: true,
                })
                .await;
            return Err(crate::common::errors::StreamError::HelperSpawnFailed(e.to_string()).into());
        }
    };

    let upstream = if stdin_input {
        spawn_upstream_command(&source_location)
    } else {
        None
    };
    if let (Some(mut upstream_child), Some(stdin)) = (upstream, child.stdin.take()) {
        pipe_upstream(&mut upstream_child, stdin);
    }

    let stdout = child.stdout.take().expect("piped stdout");
    let read_result = read_chunks(stdout, &mut child, cancel, cfg.chunk_size, tx).await;

    let _ = child.kill().await;
    drop(decoded_guard);
    read_result
}

/// `source_kind = executable_command`: run the command, pipe its stdout into
/// the audio tool's stdin (spec §4.1 "Input handling").
fn spawn_upstream_command(command_line: &str) -> Option<Child> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next()?;
    Command::new(program)
        .args(parts)
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .ok()
}

fn pipe_upstream(upstream: &mut Child, mut sink: tokio::process::ChildStdin) {
    let Some(mut upstream_stdout) = upstream.stdout.take() else {
        return;
    };
    tokio::spawn(async move {
        let _ = tokio::io::copy(&mut upstream_stdout, &mut sink).await;
    });
}

async fn read_chunks(
    mut stdout: tokio::process::ChildStdout,
    child: &mut Child,
    cancel: &CancelToken,
    chunk_size: usize,
    tx: &flume::Sender<Chunk>,
) -> AnyResult<()> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        if cancel.is_cancelled() {
            debug!("cancellation observed, terminating helper and draining");
            let _ = child.start_kill();
            let mut drained = Vec::new();
            let _ = stdout.read_to_end(&mut drained).await;
            let _ = tx
                .send_async(Chunk {
                    bytes: drained,
                    is_last: true,
                })
                .await;
            return Err(crate::common::errors::StreamError::Cancelled.into());
        }

        let read = read_fill(&mut stdout, &mut buf).await?;
        if read < chunk_size {
            let _ = tx
                .send_async(Chunk {
                    bytes: buf[..read].to_vec(),
                    is_last: true,
                })
                .await;
            return Ok(());
        }
        let _ = tx
            .send_async(Chunk {
                bytes: buf.clone(),
                is_last: false,
            })
            .await;
    }
}

/// Reads up to `buf.len()` bytes, stopping early on EOF — the terminal-chunk
/// condition per spec §4.1 ("fewer bytes than requested").
async fn read_fill(
    stdout: &mut tokio::process::ChildStdout,
    buf: &mut [u8],
) -> AnyResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = stdout.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// AAC two-stage decode route (spec §4.1 + SPEC_FULL §B.3): normalise to a
/// lossless intermediate via a dedicated decoder before the effects chain
/// ever sees it, rather than asking the SoX-compatible tool to handle AAC
/// directly.
pub async fn decode_aac_to_wav(decoder_bin: &str, source_location: &str) -> AnyResult<Vec<u8>> {
    let mut command = Command::new(decoder_bin);
    command
        .arg("-i")
        .arg(source_location)
        .arg("-f")
        .arg("wav")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| crate::common::errors::StreamError::HelperSpawnFailed(e.to_string()))?;
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut out = Vec::new();
    stdout.read_to_end(&mut out).await?;
    let status = child.wait().await?;
    if !status.success() {
        return Err(crate::common::errors::StreamError::HelperExitedEarly(
            "aac decoder exited non-zero".to_string(),
        )
        .into());
    }
    Ok(out)
}

pub fn content_type_needs_decode(content_type: &ContentType) -> bool {
    content_type.needs_decode_stage()
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ItemId, ProviderId};
    use crate::model::stream_details::{Quality, SourceKind};

    fn item_with_providers(providers: Vec<ProviderMapping>) -> QueueItem {
        QueueItem {
            item_id: ItemId::from("item-1"),
            name: "Test Track".to_string(),
            provider_list: providers,
            media_type: MediaType::Track,
            duration: 180.0,
            streamdetails: None,
        }
    }

    #[test]
    fn select_provider_picks_highest_quality() {
        let item = item_with_providers(vec![
            ProviderMapping {
                provider_id: ProviderId::from("low"),
                quality: Quality::Low,
                content_type: ContentType::Mp3,
                source_kind: SourceKind::Url,
                source_location: "http://x/low".to_string(),
            },
            ProviderMapping {
                provider_id: ProviderId::from("hi"),
                quality: Quality::Lossless,
                content_type: ContentType::Flac,
                source_kind: SourceKind::Url,
                source_location: "http://x/hi".to_string(),
            },
        ]);
        let (mapping, _details) = select_provider(&item).unwrap();
        assert_eq!(mapping.provider_id, ProviderId::from("hi"));
    }

    #[test]
    fn select_provider_none_when_empty() {
        let item = item_with_providers(vec![]);
        assert!(select_provider(&item).is_none());
    }
}
