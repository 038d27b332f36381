//! Queue stream mixer, spec §4.2. Concatenates per-item PCM, performs
//! silence-trim + crossfade, and writes a continuous stream into an
//! abstract sink until the queue is exhausted or cancellation fires.

pub mod crossfade;
pub mod silence;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, StreamEvent};
use crate::common::cancel::CancelToken;
use crate::common::types::{AnyResult, PlayerId};
use crate::configs::player::PlayerConfig;
use crate::loudness::LoudnessAnalyser;
use crate::model::format::AudioFormat;
use crate::pipeline::{self, Chunk, PipelineConfig};
use crate::queue::Queue;
use crossfade::CrossfadeEngine;

/// Destination for mixed PCM. The HTTP endpoint encodes to FLAC before
/// writing; a RAOP fan-out writes raw PCM to every live driver.
#[async_trait]
pub trait MixerSink: Send + Sync {
    async fn write(&self, bytes: &[u8]) -> AnyResult<()>;
}

pub struct MixConfig<'a> {
    pub sox_bin: &'a str,
    pub aac_decoder_bin: &'a str,
    pub player_id: PlayerId,
    pub player_config: &'a PlayerConfig,
    /// Defaults to `fade_bytes` per spec §4.2; overridable for the
    /// single-item HTTP variant (§4.3) which has no crossfade concerns.
    pub chunk_size_override: Option<usize>,
}

/// Runs `mix(queue, sink, cancel, format)` per spec §4.2. `format` is the
/// already-negotiated session format (spec §4.2 "Sample-rate negotiation").
pub async fn mix(
    queue: &dyn Queue,
    sink: &dyn MixerSink,
    cancel: &CancelToken,
    format: AudioFormat,
    cfg: MixConfig<'_>,
    bus: &EventBus,
    loudness: &std::sync::Arc<LoudnessAnalyser>,
) -> AnyResult<()> {
    let crossfade_enabled = queue.crossfade_enabled(&cfg.player_id);
    let crossfade_duration_s = queue.crossfade_duration_s(&cfg.player_id);
    let fade_bytes = format
        .fade_bytes(crossfade_duration_s)
        .max(format.frame_bytes());
    let chunk_size = cfg
        .chunk_size_override
        .unwrap_or(fade_bytes)
        .max(format.frame_bytes());

    let crossfade_engine = CrossfadeEngine::new(cfg.sox_bin);
    let mut pending_tail: Option<Vec<u8>> = None;
    let mut first = true;

    loop {
        if cancel.is_cancelled() {
            debug!("mixer cancelled before next item, exiting without EOF");
            return Err(crate::common::errors::StreamError::Cancelled.into());
        }

        if first {
            queue.start_session(&cfg.player_id).await?;
            first = false;
        }
        let Some(item) = queue.next_item(&cfg.player_id).await? else {
            break;
        };

        let session_id = crate::common::types::StreamSessionId::generate();
        let pipeline_cfg = PipelineConfig {
            sox_bin: cfg.sox_bin,
            aac_decoder_bin: cfg.aac_decoder_bin,
            chunk_size,
            target_format: format,
            resample_requested: crossfade_enabled,
            player_config: cfg.player_config,
        };

        // Producer (pipeline::run_item) and consumer (chunk classification
        // below) run concurrently on this task via a bounded channel — no
        // extra OS thread needed, since both sides only await I/O (spec §9:
        // message-passing between stages rather than a shared mutable sink).
        let (tx, rx) = flume::bounded::<Chunk>(4);
        let producer = pipeline::run_item(
            &item,
            session_id,
            &cfg.player_id,
            cancel,
            &pipeline_cfg,
            bus,
            loudness,
            tx,
        );

        let mut bytes_written_for_item: u64 = 0;
        let consumer = consume_item_chunks(
            rx,
            sink,
            &crossfade_engine,
            &format,
            fade_bytes,
            crossfade_duration_s,
            crossfade_enabled,
            &mut pending_tail,
            &mut bytes_written_for_item,
        );

        let (producer_result, consumer_result) = tokio::join!(producer, consumer);
        consumer_result?;

        if let Err(e) = producer_result {
            if matches!(
                e.downcast_ref::<crate::common::errors::StreamError>(),
                Some(crate::common::errors::StreamError::Cancelled)
            ) {
                return Err(e);
            }
            warn!(error = %e, item_id = %item.item_id, "pipeline item failed");
        }

        let bytes_per_second = format.bytes_per_second().max(1) as f64;
        let accurate_duration = bytes_written_for_item as f64 / bytes_per_second;
        queue
            .correct_duration(&item.item_id, accurate_duration)
            .await;
        bus.publish(StreamEvent::StreamEnded {
            session_id,
            item_id: item.item_id.clone(),
            corrected_duration: accurate_duration,
        });
        info!(item_id = %item.item_id, accurate_duration, "item completed, duration corrected");
    }

    if let Some(tail) = pending_tail.take() {
        sink.write(&tail).await?;
    }

    Ok(())
}

/// Chunk classification state machine, spec §4.2's per-item table.
#[allow(clippy::too_many_arguments)]
async fn consume_item_chunks(
    rx: flume::Receiver<Chunk>,
    sink: &dyn MixerSink,
    crossfade_engine: &CrossfadeEngine,
    format: &AudioFormat,
    fade_bytes: usize,
    crossfade_duration_s: u32,
    crossfade_enabled: bool,
    pending_tail: &mut Option<Vec<u8>>,
    bytes_written_for_item: &mut u64,
) -> AnyResult<()> {
    let mut chunk_index: u32 = 0;
    let mut prev_chunk: Option<Vec<u8>> = None;

    while let Ok(chunk) = rx.recv_async().await {
        chunk_index += 1;
        let is_last = chunk.is_last;

        if pending_tail.is_some() {
            if chunk_index == 1 {
                // Deferred first: buffered, not forwarded.
                prev_chunk = Some(chunk.bytes);
                continue;
            }
            if chunk_index == 2 {
                let mut combined = prev_chunk.take().unwrap_or_default();
                combined.extend_from_slice(&chunk.bytes);
                let trimmed = silence::trim_head_for_fade(&combined, fade_bytes);
                let split = fade_bytes.min(trimmed.len());
                let (fade_in, leftover) = trimmed.split_at(split);

                let tail = pending_tail.take().expect("checked Some above");
                let mixed = crossfade_engine
                    .mix(&tail, fade_in, format, crossfade_duration_s as f64)
                    .await?;
                *bytes_written_for_item += mixed.len() as u64 + leftover.len() as u64;
                sink.write(&mixed).await?;
                if !leftover.is_empty() {
                    sink.write(leftover).await?;
                }
                if is_last {
                    return Ok(());
                }
                continue;
            }
        }

        if chunk_index <= 2 && pending_tail.is_none() && !is_last {
            // Free head.
            *bytes_written_for_item += chunk.bytes.len() as u64;
            sink.write(&chunk.bytes).await?;
            continue;
        }

        if is_last {
            let mut combined = prev_chunk.take().unwrap_or_default();
            combined.extend_from_slice(&chunk.bytes);
            let trimmed = silence::trim_tail_for_fade(&combined, fade_bytes);

            if crossfade_enabled && crossfade_duration_s > 0 {
                if trimmed.len() > fade_bytes {
                    let (body, tail) = trimmed.split_at(trimmed.len() - fade_bytes);
                    *bytes_written_for_item += body.len() as u64;
                    sink.write(body).await?;
                    *pending_tail = Some(tail.to_vec());
                } else {
                    *pending_tail = Some(trimmed.to_vec());
                }
            } else {
                *bytes_written_for_item += trimmed.len() as u64;
                sink.write(trimmed).await?;
            }
            return Ok(());
        }

        // Middle: forward the chunk held one step behind, then hold this
        // one — keeps exactly one chunk of trailing context available for
        // whenever the terminal chunk arrives.
        if let Some(prev) = prev_chunk.take() {
            *bytes_written_for_item += prev.len() as u64;
            sink.write(&prev).await?;
        }
        prev_chunk = Some(chunk.bytes);
    }

    Ok(())
}
