//! WebSocket and HTTP handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::stream::StreamExt;
use serde::Serialize;

use livetrack_shared::{
    time::millis_to_rfc3339,
    wire::{self, CodecError, DeviceId},
};

use crate::state::{AppState, DevicePosition};

/// Latest position of one device as served by `GET /api/devices`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePositionDto {
    pub device_id: String,
    pub lat: f64,
    pub lng: f64,
    /// Capture time, RFC 3339
    pub time: String,
    /// Receive time, RFC 3339
    pub received_at: String,
}

impl From<&DevicePosition> for DevicePositionDto {
    fn from(position: &DevicePosition) -> Self {
        let captured_millis = position.sample.captured_at.timestamp_millis();
        let received_millis = position.received_at.timestamp_millis();
        Self {
            device_id: position.device_id.as_str().to_string(),
            lat: position.sample.latitude,
            lng: position.sample.longitude,
            time: millis_to_rfc3339(captured_millis).unwrap_or_default(),
            received_at: millis_to_rfc3339(received_millis).unwrap_or_default(),
        }
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (_sender, mut receiver) = socket.split();
    let mut received = 0u64;
    let mut last_device: Option<DeviceId> = None;

    tracing::info!("Tracker connected");

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => match apply_location(&state, text.as_str()).await {
                Ok(device_id) => {
                    received += 1;
                    last_device = Some(device_id);
                }
                Err(e) => tracing::warn!("Dropping malformed location message: {}", e),
            },
            Message::Binary(_) => {
                tracing::warn!("Ignoring binary frame");
            }
            Message::Close(frame) => {
                match frame {
                    Some(frame) => {
                        tracing::info!("Tracker closed: {} {}", frame.code, frame.reason.as_str())
                    }
                    None => tracing::info!("Tracker closed"),
                }
                break;
            }
            // Ping/Pong are answered by axum
            _ => {}
        }
    }

    match last_device {
        Some(device_id) => tracing::info!(
            "Tracker '{}' disconnected after {} location(s)",
            device_id,
            received
        ),
        None => tracing::info!("Tracker disconnected without sending a location"),
    }
}

/// Decode one text frame and store it as the device's latest position.
pub(crate) async fn apply_location(
    state: &AppState,
    text: &str,
) -> Result<DeviceId, CodecError> {
    let (sample, device_id) = wire::decode(text)?;
    tracing::debug!(
        "Location from '{}': ({}, {}) at {}",
        device_id,
        sample.latitude,
        sample.longitude,
        sample.captured_at
    );
    if !state.record(device_id.clone(), sample, Utc::now()).await {
        tracing::debug!("Out-of-order location from '{}' ignored", device_id);
    }
    Ok(device_id)
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Latest position of every device that reported
pub async fn get_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DevicePositionDto>> {
    let positions = state.latest_positions().await;
    Json(positions.iter().map(DevicePositionDto::from).collect())
}
