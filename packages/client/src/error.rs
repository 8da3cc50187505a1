//! Error types for the tracker.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the socket itself. Every variant drives the reconnect loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// WebSocket handshake could not be completed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Read or write failed on an established socket
    #[error("I/O error: {0}")]
    Io(String),

    /// Peer closed the connection
    #[error("Remote closed the connection: {0}")]
    RemoteClosed(String),
}

/// Reason a single outbound message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// No open socket at the time of the call
    #[error("Not connected")]
    NotConnected,

    /// Transport rejected the write
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Termination of the position feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Feed closed without being unsubscribed
    #[error("Position source ended unexpectedly")]
    Ended,

    /// Provider reported a failure (e.g. permission revoked)
    #[error("Position source failed: {0}")]
    Failed(String),
}

/// Startup failures of the client binary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid command-line configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device id file could not be read or written
    #[error("Device id file {}: {source}", .path.display())]
    DeviceIdFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Device id file exists but holds no usable id
    #[error("Device id file {} is empty", .0.display())]
    EmptyDeviceIdFile(PathBuf),
}
