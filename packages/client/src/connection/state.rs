//! Connection state, lifecycle events and configuration.

use std::{fmt, time::Duration};

use crate::error::{SendError, TransportError};

/// Fixed delay between a transport failure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Reason string sent with the normal-closure close frame.
pub const DEFAULT_CLOSE_REASON: &str = "tracking stopped";

/// Upper bound on waiting for a close frame to be written.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on one WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the single outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Lifecycle events published by `ConnectionManager`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A handshake was started. `attempt` counts from 1 per manager.
    Connecting { attempt: u64 },
    Opened,
    /// The socket or handshake failed.
    Failed(TransportError),
    /// One reconnect attempt will run after `delay`.
    ReconnectScheduled { delay: Duration },
    /// Closed by an explicit stop.
    Closed,
}

/// Outcome of `ConnectionManager::send`.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum SendResult {
    Delivered,
    Failed(SendError),
}

impl SendResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Connection tuning.
///
/// Writes and closes never wait longer than `reconnect_delay`, whatever
/// `close_timeout` says.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub reconnect_delay: Duration,
    pub close_reason: String,
    pub close_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            close_reason: DEFAULT_CLOSE_REASON.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Bound for a single write on an open socket.
    pub fn write_timeout(&self) -> Duration {
        self.reconnect_delay
    }

    /// Bound for writing the close frame.
    pub fn effective_close_timeout(&self) -> Duration {
        self.close_timeout.min(self.reconnect_delay)
    }
}
