//! Tracker configuration.

use std::{path::PathBuf, time::Duration};

use crate::{
    connection::{ConnectionConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECONNECT_DELAY},
    device::DEFAULT_DEVICE_ID_FILE,
    error::ClientError,
};

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:40510/";

/// Interval between position fixes.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(5_000);

/// Validated settings for one tracker process.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub url: String,
    /// Explicit id; overrides the id file when set
    pub device_id: Option<String>,
    pub device_id_file: PathBuf,
    pub reconnect_delay: Duration,
    pub handshake_timeout: Duration,
    pub sample_interval: Duration,
    pub origin_lat: f64,
    pub origin_lng: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            device_id: None,
            device_id_file: PathBuf::from(DEFAULT_DEVICE_ID_FILE),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            origin_lat: 35.681_236,
            origin_lng: 139.767_125,
        }
    }
}

impl TrackerConfig {
    /// Check the settings before anything is started.
    pub fn validate(self) -> Result<Self, ClientError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::InvalidConfig(format!(
                "server URL must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.reconnect_delay.is_zero() {
            return Err(ClientError::InvalidConfig(
                "reconnect delay must be positive".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "handshake timeout must be positive".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "sample interval must be positive".to_string(),
            ));
        }
        if !(self.origin_lat.is_finite() && (-90.0..=90.0).contains(&self.origin_lat)) {
            return Err(ClientError::InvalidConfig(format!(
                "origin latitude out of range: {}",
                self.origin_lat
            )));
        }
        if !(self.origin_lng.is_finite() && (-180.0..=180.0).contains(&self.origin_lng)) {
            return Err(ClientError::InvalidConfig(format!(
                "origin longitude out of range: {}",
                self.origin_lng
            )));
        }
        Ok(self)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_reconnect_delay(self.reconnect_delay)
            .with_handshake_timeout(self.handshake_timeout)
    }
}
