//! Live location tracker.
//!
//! Streams position samples to a server over one WebSocket, reconnecting
//! after a fixed delay whenever the connection is lost.
//!
//! - `source`: position provider seam and implementations
//! - `connection`: the single outbound socket and its state machine
//! - `session`: source -> codec -> connection pipeline
//! - `lifecycle`: start/stop control and the running flag owner

pub mod config;
pub mod connection;
pub mod console;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod running;
pub mod session;
pub mod source;
pub mod status;
pub mod transport;
