//! Sync/group coordinator, spec §4.5. Drives one mixer pass per `play_media`
//! call and fans every mixed PCM chunk out to every live delivery driver in
//! the session, tracking progress and deduplicated metadata pushes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::bus::{EventBus, StreamEvent};
use crate::common::errors::StreamError;
use crate::common::types::{AnyResult, ItemId, PlayerId};
use crate::configs::base::Config;
use crate::delivery::DeliveryDriver;
use crate::loudness::LoudnessAnalyser;
use crate::mixer::{self, MixConfig, MixerSink};
use crate::model::format::AudioFormat;
use crate::model::player_endpoint::PlayerEndpoint;
use crate::model::session::StreamSession;
use crate::queue::Queue;
use crate::raop::{RaopDriver, RaopHelper, RaopStartupArgs, generate_active_remote_id};

pub struct GroupCoordinator {
    players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
    /// `active_remote_id` (as a string) → player, populated per session so
    /// the DACP server can resolve which player an inbound command targets.
    remote_sessions: Arc<DashMap<String, PlayerId>>,
    queue: Arc<dyn Queue>,
    bus: EventBus,
    loudness: Arc<LoudnessAnalyser>,
    config: Config,
    dacp_id: String,
    active: Mutex<Option<Arc<StreamSession>>>,
    active_remotes: Mutex<Vec<String>>,
    raop_helper: RaopHelper,
    raop_verified: AtomicBool,
}

impl GroupCoordinator {
    /// Probes the RAOP helper's `-check` self-test once (SPEC_FULL §B.1);
    /// a failed probe disables RAOP delivery for the lifetime of this
    /// coordinator rather than panicking.
    pub async fn new(
        players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
        remote_sessions: Arc<DashMap<String, PlayerId>>,
        queue: Arc<dyn Queue>,
        bus: EventBus,
        loudness: Arc<LoudnessAnalyser>,
        config: Config,
        dacp_id: String,
    ) -> Self {
        let raop_helper = RaopHelper::new(config.raop_bin.clone());
        let verified = match raop_helper.verify().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "raop helper self-test failed, RAOP delivery disabled");
                false
            }
        };
        Self {
            players,
            remote_sessions,
            queue,
            bus,
            loudness,
            config,
            dacp_id,
            active: Mutex::new(None),
            active_remotes: Mutex::new(Vec::new()),
            raop_helper,
            raop_verified: AtomicBool::new(verified),
        }
    }

    /// spec §4.5: stop any active session on the leader/its members, build
    /// one `StreamSession`, start one driver per member at the same
    /// `start_ntp`, then run the mixer once, fanning every chunk out.
    pub async fn play_media(self: &Arc<Self>, leader_id: PlayerId) -> AnyResult<()> {
        self.stop_active().await;

        if !self.raop_verified.load(Ordering::SeqCst) {
            return Err("RAOP helper unavailable, cannot start playback".into());
        }

        let leader = self
            .players
            .get(&leader_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| format!("unknown leader player {leader_id}"))?;

        let mut member_ids: Vec<PlayerId> = leader.group_members.iter().cloned().collect();
        member_ids.push(leader_id.clone());

        let start_ntp = self.raop_helper.probe_ntp().await?;
        let format = AudioFormat::RAOP;
        let session = Arc::new(StreamSession::new(leader_id.clone(), start_ntp, format));

        for player_id in &member_ids {
            let Some(endpoint) = self.players.get(player_id).map(|e| e.value().clone()) else {
                continue;
            };
            let player_config = self.config.player_config(player_id);
            if !player_config.enabled {
                continue;
            }
            let active_remote_id = generate_active_remote_id();
            let args = RaopStartupArgs {
                helper_bin: &self.config.raop_bin,
                start_ntp,
                active_remote_id,
                dacp_id: &self.dacp_id,
                current_volume: endpoint.volume,
                endpoint: &endpoint,
                player_config: &player_config,
            };
            match RaopDriver::start(args, player_id.clone(), self.players.clone()).await {
                Ok(driver) => {
                    session
                        .per_endpoint
                        .insert(player_id.clone(), Arc::new(driver));
                    let remote_key = active_remote_id.to_string();
                    self.remote_sessions.insert(remote_key.clone(), player_id.clone());
                    self.active_remotes.lock().push(remote_key);
                }
                Err(e) => warn!(player_id = %player_id, error = %e, "failed to start raop driver, skipping endpoint"),
            }
        }

        if session.is_empty() {
            return Err("no delivery drivers could be started for this group".into());
        }

        *self.active.lock() = Some(session.clone());

        let current_item = Arc::new(Mutex::new(None::<(ItemId, String)>));
        let sink = FanOutSink {
            session: session.clone(),
            format,
            bytes_since_item_start: AtomicU64::new(0),
            item_for_byte_reset: Mutex::new(None),
            current_item: current_item.clone(),
            last_meta_checksum: Mutex::new(None),
        };

        let mut bus_rx = self.bus.subscribe();
        let tracked_session = session.clone();
        let tracked_queue = self.queue.clone();
        let tracker_handle = tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(StreamEvent::StreamStarted { item_id, .. }) => {
                        let name = tracked_queue
                            .find_item(&item_id)
                            .await
                            .map(|item| item.name)
                            .unwrap_or_else(|| item_id.to_string());
                        *current_item.lock() = Some((item_id, name));
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
                if tracked_session.is_empty() {
                    break;
                }
            }
        });

        let player_config = self.config.player_config(&leader_id);
        let mix_cfg = MixConfig {
            sox_bin: &self.config.sox_bin,
            aac_decoder_bin: &self.config.aac_decoder_bin,
            player_id: leader_id.clone(),
            player_config: &player_config,
            chunk_size_override: None,
        };

        let result = mixer::mix(
            self.queue.as_ref(),
            &sink,
            &session.cancel,
            format,
            mix_cfg,
            &self.bus,
            &self.loudness,
        )
        .await;

        tracker_handle.abort();
        *self.active.lock() = None;
        result
    }

    pub async fn stop_active(&self) {
        let session = self.active.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            for driver in session.live_drivers() {
                let _ = driver.stop().await;
            }
        }
        for remote_key in self.active_remotes.lock().drain(..) {
            self.remote_sessions.remove(&remote_key);
        }
    }
}

/// Fans mixed PCM out to every live driver in the session, spec §4.5.
struct FanOutSink {
    session: Arc<StreamSession>,
    format: AudioFormat,
    bytes_since_item_start: AtomicU64,
    item_for_byte_reset: Mutex<Option<ItemId>>,
    current_item: Arc<Mutex<Option<(ItemId, String)>>>,
    last_meta_checksum: Mutex<Option<String>>,
}

#[async_trait]
impl MixerSink for FanOutSink {
    async fn write(&self, bytes: &[u8]) -> AnyResult<()> {
        let drivers = self.session.live_drivers();
        if drivers.is_empty() {
            return Err(StreamError::EndpointUnreachable(
                "no live delivery drivers remain in this session".to_string(),
            )
            .into());
        }

        let writes = drivers.iter().map(|d| d.write_chunk(bytes));
        for result in futures::future::join_all(writes).await {
            if let Err(e) = result {
                warn!(error = %e, "delivery driver write failed");
            }
        }

        let item_snapshot = self.current_item.lock().clone();
        let item_id = item_snapshot.as_ref().map(|(id, _)| id.clone());
        {
            let mut reset_key = self.item_for_byte_reset.lock();
            if *reset_key != item_id {
                *reset_key = item_id.clone();
                self.bytes_since_item_start.store(0, Ordering::SeqCst);
            }
        }
        let bytes_so_far = self
            .bytes_since_item_start
            .fetch_add(bytes.len() as u64, Ordering::SeqCst)
            + bytes.len() as u64;
        let elapsed = bytes_so_far as f64 / self.format.bytes_per_second().max(1) as f64;

        let progress_futs = drivers.iter().map(|d| d.send_progress(elapsed));
        futures::future::join_all(progress_futs).await;

        if let Some((item_id, title)) = item_snapshot {
            let checksum = item_id.to_string();
            let changed = {
                let mut last = self.last_meta_checksum.lock();
                if last.as_deref() == Some(checksum.as_str()) {
                    false
                } else {
                    *last = Some(checksum);
                    true
                }
            };
            if changed {
                let meta_futs = drivers.iter().map(|d| d.send_metadata(&title, 0.0));
                futures::future::join_all(meta_futs).await;
            }
        }

        Ok(())
    }
}
