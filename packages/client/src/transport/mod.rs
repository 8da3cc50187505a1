//! Socket transport seam.
//!
//! `ConnectionManager` only talks to these traits. The production
//! implementation is `websocket::WebSocketTransport`; tests script a fake.

use async_trait::async_trait;

use crate::error::TransportError;

pub mod websocket;

#[cfg(test)]
pub(crate) mod fake;

pub use websocket::WebSocketTransport;

/// An established socket split into its write and read halves.
pub struct Socket {
    pub writer: Box<dyn SocketWriter>,
    pub reader: Box<dyn SocketReader>,
}

/// Opens sockets to the configured endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake and return the new socket.
    async fn open(&self) -> Result<Socket, TransportError>;
}

/// Write half of a socket.
#[async_trait]
pub trait SocketWriter: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close with normal closure and the given reason.
    async fn close(&mut self, reason: &str) -> Result<(), TransportError>;
}

/// Read half of a socket.
#[async_trait]
pub trait SocketReader: Send {
    /// Drain incoming frames until the socket dies, returning why.
    async fn closed(&mut self) -> TransportError;
}
