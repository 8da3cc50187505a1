//! Development receiver for the livetrack wire protocol.
//!
//! Accepts tracker connections on `/`, decodes every location message and
//! keeps the latest fix per device in memory.

mod handler;
mod server;
pub mod state;

pub use server::Server;
pub use state::{AppState, DevicePosition};
