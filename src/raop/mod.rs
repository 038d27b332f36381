//! RAOP delivery driver, spec §4.4. One helper process per endpoint,
//! controlled through stdin (PCM), stderr (state transitions) and a named
//! one-shot control pipe.

pub mod fifo;
pub mod stderr;

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::types::{AnyResult, PlayerId};
use crate::configs::player::PlayerConfig;
use crate::delivery::DeliveryDriver;
use crate::model::player_endpoint::{PlayerEndpoint, PlayerState};
use crate::raop::fifo::ControlFifo;
use crate::raop::stderr::{classify_line, Transition};

/// Probes and invokes the external `cliraop`-style helper binary.
pub struct RaopHelper {
    bin: String,
}

impl RaopHelper {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// spec supplement B.1: `-check` must print `cliraop check`. Returns
    /// `Ok(())` on a verified binary, `Err` otherwise — callers are
    /// expected to disable RAOP delivery rather than panic on failure.
    pub async fn verify(&self) -> AnyResult<()> {
        let output = Command::new(&self.bin).arg("-check").output().await?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if combined.contains("cliraop check") {
            Ok(())
        } else {
            Err(format!("helper '{}' failed -check self-test", self.bin).into())
        }
    }

    /// `helper -ntp`: prints an NTP timestamp then exits.
    pub async fn probe_ntp(&self) -> AnyResult<u64> {
        let output = Command::new(&self.bin).arg("-ntp").output().await?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<u64>()
            .map_err(|e| format!("unparseable NTP output from helper: {e}").into())
    }
}

/// A freshly generated per-session id in `[1000, 8000)`, spec §4.4.
pub fn generate_active_remote_id() -> u32 {
    rand::thread_rng().gen_range(1000..8000)
}

#[allow(clippy::too_many_arguments)]
pub struct RaopStartupArgs<'a> {
    pub helper_bin: &'a str,
    pub start_ntp: u64,
    pub active_remote_id: u32,
    pub dacp_id: &'a str,
    pub current_volume: u8,
    pub endpoint: &'a PlayerEndpoint,
    pub player_config: &'a PlayerConfig,
}

fn build_argv(args: &RaopStartupArgs<'_>, control_path: &std::path::Path) -> Vec<String> {
    let sync_adjust = 2500 - args.player_config.sync_adjust_ms;
    let mut argv = vec![
        "-n".to_string(),
        args.start_ntp.to_string(),
        "-l".to_string(),
        args.player_config.latency_ms.to_string(),
        "-w".to_string(),
        sync_adjust.to_string(),
        "-v".to_string(),
        args.current_volume.to_string(),
        "-dacp".to_string(),
        args.dacp_id.to_string(),
        "-ar".to_string(),
        args.active_remote_id.to_string(),
    ];
    if args.player_config.encryption {
        argv.push("-e".to_string());
    }
    if args.player_config.alac_encode {
        argv.push("-a".to_string());
    }
    if let Some(password) = &args.player_config.device_password {
        argv.push("-P".to_string());
        argv.push(password.clone());
    }
    if let Some(md) = args.endpoint.discovery_props.get("md") {
        argv.push("-md".to_string());
        argv.push(md.clone());
    }
    if let Some(et) = args.endpoint.discovery_props.get("et") {
        argv.push("-et".to_string());
        argv.push(et.clone());
    }
    let _ = control_path;
    argv.push(args.endpoint.address.clone());
    argv.push("-".to_string());
    argv
}

pub struct RaopDriver {
    player_id: PlayerId,
    start_ntp: u64,
    control: ControlFifo,
    stdin: AsyncMutex<Option<ChildStdin>>,
    child: AsyncMutex<Option<Child>>,
    stderr_task: AsyncMutex<Option<JoinHandle<()>>>,
    players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
}

impl RaopDriver {
    pub async fn start(
        args: RaopStartupArgs<'_>,
        player_id: PlayerId,
        players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
    ) -> AnyResult<Self> {
        let control = ControlFifo::create(args.active_remote_id)?;
        let argv = build_argv(&args, control.path());

        let mut command = Command::new(args.helper_bin);
        command
            .args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            format!("failed to spawn RAOP helper '{}': {e}", args.helper_bin)
        })?;

        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .ok_or("RAOP helper spawned without a stderr pipe")?;

        let driver_player_id = player_id.clone();
        let registry = players.clone();
        let stderr_task = tokio::spawn(async move {
            run_stderr_reader(stderr, driver_player_id, registry).await;
        });

        if let Some(mut entry) = players.get_mut(&player_id) {
            entry.state = PlayerState::Idle;
        }

        Ok(Self {
            player_id,
            start_ntp: args.start_ntp,
            control,
            stdin: AsyncMutex::new(stdin),
            child: AsyncMutex::new(Some(child)),
            stderr_task: AsyncMutex::new(Some(stderr_task)),
            players,
        })
    }

    fn set_state(&self, state: PlayerState) {
        if let Some(mut entry) = self.players.get_mut(&self.player_id) {
            entry.state = state;
        }
    }
}

async fn run_stderr_reader(
    stderr: tokio::process::ChildStderr,
    player_id: PlayerId,
    players: Arc<DashMap<PlayerId, PlayerEndpoint>>,
) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match classify_line(&line) {
                Transition::Playing { reset_elapsed } => {
                    if let Some(mut entry) = players.get_mut(&player_id) {
                        entry.state = PlayerState::Playing;
                        if reset_elapsed {
                            entry.elapsed_ms = 0;
                        }
                    }
                }
                Transition::Paused => {
                    if let Some(mut entry) = players.get_mut(&player_id) {
                        entry.state = PlayerState::Paused;
                    }
                }
                Transition::ElapsedUpdate(ms) => {
                    debug!(player_id = %player_id, elapsed_ms = ms, "raop helper progress");
                    if let Some(mut entry) = players.get_mut(&player_id) {
                        entry.elapsed_ms = ms;
                    }
                }
                Transition::None => {}
            },
            Ok(None) => break,
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "error reading raop helper stderr");
                break;
            }
        }
    }
    if let Some(mut entry) = players.get_mut(&player_id) {
        entry.state = PlayerState::Idle;
    }
}

#[async_trait]
impl DeliveryDriver for RaopDriver {
    fn start_ntp(&self) -> u64 {
        self.start_ntp
    }

    async fn write_chunk(&self, bytes: &[u8]) -> AnyResult<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Ok(());
        };
        match stdin.write_all(bytes).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                *guard = None;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        stdin.flush().await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        Ok(())
    }

    async fn write_eof(&self) -> AnyResult<()> {
        {
            let mut guard = self.stdin.lock().await;
            *guard = None; // dropping ChildStdin closes the write end
        }
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            let _ = child.wait().await;
        }
        *guard = None;
        Ok(())
    }

    async fn stop(&self) -> AnyResult<()> {
        let _ = self.control.send("ACTION=STOP").await;
        {
            let mut guard = self.child.lock().await;
            if let Some(child) = guard.as_mut() {
                let _ = child.wait().await;
            }
            *guard = None;
        }
        if let Some(task) = self.stderr_task.lock().await.take() {
            task.abort();
        }
        self.set_state(PlayerState::Idle);
        info!(player_id = %self.player_id, "raop driver stopped");
        Ok(())
    }

    async fn send_progress(&self, elapsed_seconds: f64) {
        let _ = self.control.send(&format!("PROGRESS={elapsed_seconds:.3}")).await;
    }

    async fn send_metadata(&self, title: &str, duration_s: f64) {
        let _ = self.control.send(&format!("TITLE={title}")).await;
        let _ = self.control.send(&format!("DURATION={duration_s:.3}")).await;
        let _ = self.control.send("ACTION=SENDMETA").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_endpoint() -> PlayerEndpoint {
        let mut endpoint = PlayerEndpoint::new(PlayerId::from("kitchen"), "10.0.0.5:5000".into());
        endpoint.discovery_props = HashMap::from([
            ("md".to_string(), "0,1,2".to_string()),
            ("et".to_string(), "0,1".to_string()),
        ]);
        endpoint
    }

    #[test]
    fn active_remote_id_is_within_spec_range() {
        for _ in 0..50 {
            let id = generate_active_remote_id();
            assert!((1000..8000).contains(&id));
        }
    }

    #[test]
    fn argv_carries_sync_adjust_offset_from_base_2500() {
        let endpoint = sample_endpoint();
        let mut player_config = PlayerConfig::default();
        player_config.sync_adjust_ms = 100;
        let args = RaopStartupArgs {
            helper_bin: "cliraop",
            start_ntp: 42,
            active_remote_id: 1500,
            dacp_id: "ABCD1234",
            current_volume: 50,
            endpoint: &endpoint,
            player_config: &player_config,
        };
        let argv = build_argv(&args, std::path::Path::new("/tmp/x"));
        let w_index = argv.iter().position(|a| a == "-w").unwrap();
        assert_eq!(argv[w_index + 1], "2400");
    }

    #[test]
    fn argv_includes_md_et_and_destination_address() {
        let endpoint = sample_endpoint();
        let player_config = PlayerConfig::default();
        let args = RaopStartupArgs {
            helper_bin: "cliraop",
            start_ntp: 1,
            active_remote_id: 1000,
            dacp_id: "ID",
            current_volume: 100,
            endpoint: &endpoint,
            player_config: &player_config,
        };
        let argv = build_argv(&args, std::path::Path::new("/tmp/x"));
        assert!(argv.contains(&"10.0.0.5:5000".to_string()));
        assert_eq!(argv.last().unwrap(), "-");
        assert!(argv.windows(2).any(|w| w[0] == "-md" && w[1] == "0,1,2"));
    }
}
