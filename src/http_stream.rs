//! HTTP stream endpoint, spec §4.3.
//!
//! `GET /stream/{player_id}[/{queue_item_id}]`. FLAC chunked body. Unknown
//! player/item → 404. Client disconnect sets the session's cancel token;
//! the pipeline/mixer keep draining helper output in the background so no
//! process is left orphaned (spec §4.3, §5).

use std::process::Stdio;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::common::cancel::CancelToken;
use crate::common::errors::{ApiError, StreamError};
use crate::common::types::{AnyResult, ItemId, PlayerId};
use crate::mixer::{self, MixConfig, MixerSink};
use crate::model::format::AudioFormat;
use crate::pipeline::{self, Chunk, PipelineConfig};
use crate::server::AppState;

/// Raw PCM → FLAC (compression level 0) encoding stage, spec §4.3 "Encoded
/// output": the mixer/pipeline only ever produce raw PCM, so every HTTP
/// response body is encoded by piping through `sox` between the mixer and
/// the channel that backs the axum body.
struct FlacEncoder {
    stdin: AsyncMutex<Option<ChildStdin>>,
    child: AsyncMutex<Option<Child>>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl FlacEncoder {
    fn spawn(
        sox_bin: &str,
        format: &AudioFormat,
        tx: flume::Sender<Bytes>,
        cancel: CancelToken,
    ) -> AnyResult<Self> {
        let mut argv: Vec<String> = vec!["-t".to_string(), "raw".to_string()];
        argv.extend(format.sox_encoding_args());
        argv.push("-".to_string());
        argv.extend(["-t".to_string(), "flac".to_string(), "-C".to_string(), "0".to_string()]);
        argv.push("-".to_string());

        let mut command = Command::new(sox_bin);
        command
            .args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| StreamError::HelperSpawnFailed(e.to_string()))?;
        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().expect("piped stdout");

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send_async(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            cancel.cancel();
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            stdin: AsyncMutex::new(stdin),
            child: AsyncMutex::new(Some(child)),
            reader: AsyncMutex::new(Some(reader)),
        })
    }

    async fn finish(&self) {
        {
            let mut guard = self.stdin.lock().await;
            *guard = None; // dropping ChildStdin closes stdin, signalling EOF to sox
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.wait().await;
        }
        if let Some(task) = self.reader.lock().await.take() {
            let _ = task.await;
        }
    }
}

#[async_trait::async_trait]
impl MixerSink for FlacEncoder {
    async fn write(&self, bytes: &[u8]) -> AnyResult<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Ok(());
        };
        match stdin.write_all(bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                *guard = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn router() -> axum::Router<Arc<AppState>> {
    axum::Router::new()
        .route("/stream/{player_id}", axum::routing::get(stream_full))
        .route(
            "/stream/{player_id}/{queue_item_id}",
            axum::routing::get(stream_single_item),
        )
}

async fn stream_full(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Response {
    let player_id = PlayerId::from(player_id);
    if !state.players.contains_key(&player_id) {
        return not_found("Player not found", &format!("/stream/{player_id}"));
    }

    let cancel = CancelToken::new();
    let (tx, rx) = flume::bounded::<Bytes>(8);

    let state_for_task = state.clone();
    let player_id_for_task = player_id.clone();
    tokio::spawn(async move {
        run_full_mix(state_for_task, player_id_for_task, tx, cancel).await;
    });

    flac_response(rx)
}

async fn run_full_mix(
    state: Arc<AppState>,
    player_id: PlayerId,
    tx: flume::Sender<Bytes>,
    cancel: CancelToken,
) {
    let player_config = state.config.player_config(&player_id);
    let sample_rate = AudioFormat::negotiate_sample_rate(Some(player_config.resolved_sample_rate()));
    let format = AudioFormat {
        sample_rate,
        ..AudioFormat::RAOP
    };

    let cfg = MixConfig {
        sox_bin: &state.config.sox_bin,
        aac_decoder_bin: &state.config.aac_decoder_bin,
        player_id: player_id.clone(),
        player_config: &player_config,
        chunk_size_override: None,
    };

    let encoder = match FlacEncoder::spawn(&state.config.sox_bin, &format, tx, cancel.clone()) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(player_id = %player_id, error = %e, "failed to spawn flac encoder");
            return;
        }
    };

    if let Err(e) = mixer::mix(
        state.queue.as_ref(),
        &encoder,
        &cancel,
        format,
        cfg,
        &state.bus,
        &state.loudness,
    )
    .await
    {
        warn!(player_id = %player_id, error = %e, "http stream mix ended with error");
    }
    encoder.finish().await;
}

async fn stream_single_item(
    State(state): State<Arc<AppState>>,
    Path((player_id, queue_item_id)): Path<(String, String)>,
) -> Response {
    let player_id = PlayerId::from(player_id);
    let item_id = ItemId::from(queue_item_id);

    if !state.players.contains_key(&player_id) {
        return not_found("Player not found", &format!("/stream/{player_id}"));
    }

    let Some(item) = state.queue.find_item(&item_id).await else {
        return not_found(
            "Invalid Queue item Id",
            &format!("/stream/{player_id}/{item_id}"),
        );
    };

    let cancel = CancelToken::new();
    let (tx, rx) = flume::bounded::<Bytes>(8);

    let state_for_task = state.clone();
    let player_id_for_task = player_id.clone();
    tokio::spawn(async move {
        run_single_item(state_for_task, player_id_for_task, item, tx, cancel).await;
    });

    flac_response(rx)
}

async fn run_single_item(
    state: Arc<AppState>,
    player_id: PlayerId,
    item: crate::model::QueueItem,
    tx: flume::Sender<Bytes>,
    cancel: CancelToken,
) {
    let player_config = state.config.player_config(&player_id);
    let sample_rate = AudioFormat::negotiate_sample_rate(Some(player_config.resolved_sample_rate()));
    let format = AudioFormat {
        sample_rate,
        ..AudioFormat::RAOP
    };
    let chunk_size = format.bytes_per_second();

    let pipeline_cfg = PipelineConfig {
        sox_bin: &state.config.sox_bin,
        aac_decoder_bin: &state.config.aac_decoder_bin,
        chunk_size,
        target_format: format,
        resample_requested: true,
        player_config: &player_config,
    };

    let (chunk_tx, chunk_rx) = flume::bounded::<Chunk>(4);
    let session_id = crate::common::types::StreamSessionId::generate();

    let encoder = match FlacEncoder::spawn(&state.config.sox_bin, &format, tx, cancel.clone()) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(item_id = %item.item_id, error = %e, "failed to spawn flac encoder");
            return;
        }
    };

    let producer = pipeline::run_item(
        &item,
        session_id,
        &player_id,
        &cancel,
        &pipeline_cfg,
        &state.bus,
        &state.loudness,
        chunk_tx,
    );

    let forward = async {
        while let Ok(chunk) = chunk_rx.recv_async().await {
            let is_last = chunk.is_last;
            if encoder.write(&chunk.bytes).await.is_err() {
                cancel.cancel();
                break;
            }
            if is_last {
                break;
            }
        }
        encoder.finish().await;
    };

    let (result, _) = tokio::join!(producer, forward);
    if let Err(e) = result {
        warn!(item_id = %item.item_id, error = %e, "single-item stream ended with error");
    }
    info!(item_id = %item.item_id, "single-item stream finished");
}

fn flac_response(rx: flume::Receiver<Bytes>) -> Response {
    let stream = rx.into_stream().map(Ok::<_, std::io::Error>);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/flac")
        .body(body)
        .unwrap()
}

fn not_found(message: &str, path: &str) -> Response {
    let body = ApiError::not_found(message, path);
    (StatusCode::NOT_FOUND, axum::Json(body)).into_response()
}
