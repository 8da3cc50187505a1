//! Wire protocol between the tracker and the receiving server.
//!
//! Every position sample travels as one UTF-8 JSON text frame:
//!
//! ```text
//! {"lat":<f64>,"lng":<f64>,"time":<i64 epoch-ms>,"deviceId":"<string>"}
//! ```
//!
//! There is no batching and no acknowledgement. `encode` is what the tracker
//! puts on the socket; `decode` is what the receiver (and the tests) use to
//! read it back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::millis_to_datetime;

/// A single geographic fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            captured_at,
        }
    }
}

/// Identifier of the installation sending positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id. Blank ids are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, CodecError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CodecError::InvalidDeviceId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized form of a position sample. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessage {
    pub lat: f64,
    pub lng: f64,
    /// Unix timestamp (milliseconds) of the fix
    pub time: i64,
    pub device_id: String,
}

impl LocationMessage {
    /// Build the message for a sample, checking the coordinates are finite.
    pub fn from_sample(sample: &PositionSample, device_id: &DeviceId) -> Result<Self, CodecError> {
        check_finite("lat", sample.latitude)?;
        check_finite("lng", sample.longitude)?;

        Ok(Self {
            lat: sample.latitude,
            lng: sample.longitude,
            time: sample.captured_at.timestamp_millis(),
            device_id: device_id.as_str().to_string(),
        })
    }

    /// Split the message back into the sample and the sender.
    pub fn into_parts(self) -> Result<(PositionSample, DeviceId), CodecError> {
        let captured_at =
            millis_to_datetime(self.time).ok_or(CodecError::InvalidTimestamp(self.time))?;
        let device_id = DeviceId::new(self.device_id)?;
        Ok((
            PositionSample::new(self.lat, self.lng, captured_at),
            device_id,
        ))
    }
}

/// Wire encoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Latitude or longitude is NaN or infinite
    #[error("Coordinate '{field}' is not finite: {value}")]
    NonFiniteCoordinate { field: &'static str, value: f64 },

    /// Timestamp cannot be represented as an instant
    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    /// Device id is blank
    #[error("Device id must not be empty")]
    InvalidDeviceId,

    /// Malformed JSON payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn check_finite(field: &'static str, value: f64) -> Result<(), CodecError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CodecError::NonFiniteCoordinate { field, value })
    }
}

/// Encode a sample into its wire text.
///
/// Sub-millisecond precision of `captured_at` is truncated.
pub fn encode(sample: &PositionSample, device_id: &DeviceId) -> Result<String, CodecError> {
    let message = LocationMessage::from_sample(sample, device_id)?;
    Ok(serde_json::to_string(&message)?)
}

/// Decode wire text back into a sample and its device id.
pub fn decode(text: &str) -> Result<(PositionSample, DeviceId), CodecError> {
    let message: LocationMessage = serde_json::from_str(text)?;
    check_finite("lat", message.lat)?;
    check_finite("lng", message.lng)?;
    message.into_parts()
}
