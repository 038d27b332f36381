//! DACP control server, spec §4.7. A TCP server bound to a dynamically
//! chosen port, advertised via mDNS, translating one HTTP/1.0-shaped
//! request per connection into a queue/player command keyed by the
//! `Active-Remote` header.

pub mod mdns;
pub mod request;

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, StreamEvent};
use crate::common::types::{AnyResult, PlayerId};
use crate::group::GroupCoordinator;
use crate::model::player_endpoint::PlayerEndpoint;
use crate::queue::Queue;
use request::{DacpAction, classify_path, parse_request, remap_device_volume_db, should_apply_volume};

/// A fresh per-server identity, used both as `-dacp <id>` passed to every
/// RAOP helper and as the mDNS instance name suffix.
pub fn generate_dacp_id() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap().to_ascii_uppercase())
        .collect()
}

pub struct DacpServer {
    players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
    remote_sessions: Arc<DashMap<String, PlayerId>>,
    group: Arc<GroupCoordinator>,
    queue: Arc<dyn Queue>,
    bus: EventBus,
    dacp_id: String,
}

impl DacpServer {
    pub fn new(
        players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
        remote_sessions: Arc<DashMap<String, PlayerId>>,
        group: Arc<GroupCoordinator>,
        queue: Arc<dyn Queue>,
        bus: EventBus,
        dacp_id: String,
    ) -> Self {
        Self {
            players,
            remote_sessions,
            group,
            queue,
            bus,
            dacp_id,
        }
    }

    pub fn dacp_id(&self) -> &str {
        &self.dacp_id
    }

    /// Binds the first free port in `range`, spec §4.7 `[39831, 49831]`.
    pub async fn bind(host: &str, range: (u16, u16)) -> AnyResult<(TcpListener, u16)> {
        for port in range.0..=range.1 {
            if let Ok(listener) = TcpListener::bind((host, port)).await {
                return Ok((listener, port));
            }
        }
        Err(format!("no free DACP port in [{}, {}]", range.0, range.1).into())
    }

    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "DACP accept failed");
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let mut buf = vec![0u8; 4096];
        let n = match stream.read(&mut buf).await {
            Ok(n) if n > 0 => n,
            _ => return,
        };
        let raw = String::from_utf8_lossy(&buf[..n]).into_owned();

        match parse_request(&raw) {
            Some(request) => self.dispatch(&request).await,
            None => debug!("failed to parse DACP request, dropping connection"),
        }

        let _ = stream.write_all(dacp_response().as_bytes()).await;
    }

    async fn dispatch(&self, request: &request::DacpRequest) {
        let player_id = request
            .active_remote
            .as_ref()
            .and_then(|remote| self.remote_sessions.get(remote).map(|e| e.value().clone()));

        if let Some(db_str) = request.query.get("dmcp.device-volume") {
            if let (Some(pid), Ok(db)) = (&player_id, db_str.parse::<f64>()) {
                self.apply_volume(pid, remap_device_volume_db(db)).await;
            }
        } else if let Some(v_str) = request.query.get("dmcp.volume") {
            if let (Some(pid), Ok(v)) = (&player_id, v_str.parse::<u8>()) {
                self.apply_volume(pid, v.min(100)).await;
            }
        }

        match classify_path(&request.path) {
            DacpAction::QueueNext => {
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.skip(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.next failed");
                    }
                }
            }
            DacpAction::QueuePrevious => {
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.previous(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.previous failed");
                    }
                }
            }
            DacpAction::QueuePlay => {
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.play(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.play failed");
                    }
                }
            }
            DacpAction::QueuePlayPause => {
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.play_pause(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.play_pause failed");
                    }
                }
            }
            DacpAction::QueuePause => {
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.pause(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.pause failed");
                    }
                }
            }
            DacpAction::PlayerStop => {
                info!("DACP player.stop");
                self.group.stop_active().await;
                if let Some(pid) = &player_id {
                    if let Err(e) = self.queue.stop(pid).await {
                        warn!(player_id = %pid, error = %e, "queue.stop failed");
                    }
                }
            }
            DacpAction::VolumeUp => {
                if let Some(pid) = &player_id {
                    self.bump_volume(pid, 5).await;
                }
            }
            DacpAction::VolumeDown => {
                if let Some(pid) = &player_id {
                    self.bump_volume(pid, -5).await;
                }
            }
            DacpAction::ShuffleToggle => {
                if let Some(pid) = &player_id {
                    let next = !self.queue.shuffle_enabled(pid);
                    if let Err(e) = self.queue.set_shuffle(pid, next).await {
                        warn!(player_id = %pid, error = %e, "queue.set_shuffle failed");
                    }
                }
            }
            DacpAction::Unknown => debug!(path = %request.path, "unrecognised DACP path, answering 204"),
        }
    }

    async fn apply_volume(&self, player_id: &PlayerId, proposed: u8) {
        let should_apply = {
            let Some(entry) = self.players.get(player_id) else {
                return;
            };
            should_apply_volume(entry.volume, proposed)
        };
        if !should_apply {
            return;
        }
        if let Some(mut entry) = self.players.get_mut(player_id) {
            entry.volume = proposed;
        }
        if let Err(e) = self.queue.set_volume(player_id, proposed).await {
            warn!(player_id = %player_id, error = %e, "queue.set_volume failed");
        }
        self.bus.publish(StreamEvent::VolumeChanged {
            player_id: player_id.clone(),
            volume: proposed,
        });
    }

    async fn bump_volume(&self, player_id: &PlayerId, delta: i32) {
        let Some(current) = self.players.get(player_id).map(|e| e.volume) else {
            return;
        };
        let next = (current as i32 + delta).clamp(0, 100) as u8;
        self.apply_volume(player_id, next).await;
    }
}

fn dacp_response() -> String {
    let date = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc2822)
        .unwrap_or_default();
    format!(
        "HTTP/1.0 204 No Content\r\n\
         Date: {date}\r\n\
         DAAP-Server: streamcore/{}\r\n\
         Content-Type: application/x-dmap-tagged\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\
         \r\n",
        env!("CARGO_PKG_VERSION")
    )
}
