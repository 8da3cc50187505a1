//! Shared building blocks for the livetrack client and server.
//!
//! - `logger`: tracing subscriber setup used by both binaries
//! - `signal`: Ctrl+C / SIGTERM shutdown future
//! - `time`: clock abstraction so position timestamps are testable
//! - `wire`: the JSON wire contract between tracker and receiver

pub mod logger;
pub mod signal;
pub mod time;
pub mod wire;
