//! Core data model, spec §3.
//!
//! These types are the shared vocabulary between the pipeline, mixer,
//! delivery drivers, group coordinator and control plane. They carry no
//! behavior beyond small invariant-preserving constructors/accessors —
//! the operations that act on them live in their owning modules
//! (`pipeline`, `mixer`, `raop`, `group`, `dacp`).

pub mod format;
pub mod player_endpoint;
pub mod queue_item;
pub mod session;
pub mod stream_details;

pub use format::{AudioFormat, BitDepth, Channels, Endianness, Signedness};
pub use player_endpoint::{PlayerEndpoint, PlayerState};
pub use queue_item::{MediaType, ProviderMapping, QueueItem};
pub use session::{CrossfadeBuffer, StreamSession};
pub use stream_details::{ContentType, Quality, SourceKind, StreamDetails};
