//! Status sink consumed by the UI layer.
//!
//! Callbacks run on the session task. Implementations that render on their
//! own thread must hop there themselves, and must not block.

use crate::connection::ConnectionState;

/// Observer of the latest sample and the connection state.
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    /// Called once per sample delivered by the source, sent or not.
    fn on_sample(&self, latitude: f64, longitude: f64);

    fn on_connection_state_changed(&self, state: ConnectionState);
}

/// Headless sink rendering the notification text through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl LogStatusSink {
    /// Text shown for a sample.
    pub fn sample_text(latitude: f64, longitude: f64) -> String {
        format!("Location: ({} , {})", latitude, longitude)
    }

    /// Text shown for a connection state.
    pub fn state_text(state: ConnectionState) -> &'static str {
        match state {
            ConnectionState::Disconnected => "Server: offline",
            ConnectionState::Connecting => "Server: connecting...",
            ConnectionState::Open => "Server: online",
            ConnectionState::Closing => "Server: closing...",
        }
    }
}

impl StatusSink for LogStatusSink {
    fn on_sample(&self, latitude: f64, longitude: f64) {
        tracing::info!("{}", Self::sample_text(latitude, longitude));
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        tracing::info!("{}", Self::state_text(state));
    }
}
