//! WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};

use crate::error::TransportError;

use super::{Socket, SocketReader, SocketWriter, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens plain WebSocket connections to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<Socket, TransportError> {
        let (ws_stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            self.url,
            response.status()
        );

        let (sink, stream) = ws_stream.split();
        Ok(Socket {
            writer: Box::new(WebSocketWriter { sink }),
            reader: Box::new(WebSocketReader { stream }),
        })
    }
}

struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl SocketWriter for WebSocketWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl SocketReader for WebSocketReader {
    async fn closed(&mut self) -> TransportError {
        while let Some(message) = self.stream.next().await {
            match message {
                // The server never talks back in this protocol; frames are only logged.
                Ok(Message::Text(text)) => tracing::debug!("Received text frame: {}", text),
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Received binary frame ({} bytes)", data.len())
                }
                Ok(Message::Close(frame)) => {
                    let reason = match frame {
                        Some(frame) => format!("{} {}", u16::from(frame.code), frame.reason),
                        None => "no close frame".to_string(),
                    };
                    return TransportError::RemoteClosed(reason);
                }
                Ok(_) => {}
                Err(e) => return TransportError::Io(e.to_string()),
            }
        }

        TransportError::RemoteClosed("stream ended".to_string())
    }
}
