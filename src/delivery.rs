//! `DeliveryDriver` — the contract a session's per-endpoint driver must
//! satisfy, shared between the RAOP driver (§4.4) and the HTTP sink so the
//! group coordinator (§4.5) and mixer (§4.2) can fan out PCM without caring
//! which kind of endpoint is on the other end.

use async_trait::async_trait;

use crate::common::types::AnyResult;

#[async_trait]
pub trait DeliveryDriver: Send + Sync {
    /// The `start_ntp` this driver was initialised with — used by the group
    /// coordinator to detect orphaned drivers (spec §3 `StreamSession`).
    fn start_ntp(&self) -> u64;

    /// No-op if the process has exited or stdin is closed. Must absorb
    /// broken-pipe errors and apply backpressure before returning.
    async fn write_chunk(&self, bytes: &[u8]) -> AnyResult<()>;

    /// Closes stdin and waits for process exit. No-op if already exited.
    async fn write_eof(&self) -> AnyResult<()>;

    /// Issues a stop command and waits for the endpoint to acknowledge it.
    async fn stop(&self) -> AnyResult<()>;

    /// Pushes `PROGRESS=<seconds>` to the endpoint's control channel. A
    /// no-op for sinks that have no reverse control channel (e.g. generic
    /// HTTP clients).
    async fn send_progress(&self, elapsed_seconds: f64) {
        let _ = elapsed_seconds;
    }

    /// Pushes `TITLE=`/`DURATION=`/`ACTION=SENDMETA` when the track identity
    /// changes (spec §4.5 "Metadata is pushed only when the checksum...
    /// changes"). A no-op for sinks with no reverse control channel.
    async fn send_metadata(&self, title: &str, duration_s: f64) {
        let _ = (title, duration_s);
    }
}
