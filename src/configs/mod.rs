pub mod base;
pub mod endpoint;
pub mod logging;
pub mod player;
pub mod server;

pub use base::*;
pub use endpoint::*;
pub use logging::*;
pub use player::*;
pub use server::*;
