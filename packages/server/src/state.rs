//! Shared receiver state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use livetrack_shared::wire::{DeviceId, PositionSample};
use tokio::sync::Mutex;

/// Latest known fix of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePosition {
    pub device_id: DeviceId,
    pub sample: PositionSample,
    pub received_at: DateTime<Utc>,
}

/// Shared application state
#[derive(Debug, Default)]
pub struct AppState {
    /// Latest position per device
    positions: Mutex<HashMap<DeviceId, DevicePosition>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fix. Fixes older than the stored one are ignored.
    ///
    /// Returns whether the stored position changed.
    pub async fn record(
        &self,
        device_id: DeviceId,
        sample: PositionSample,
        received_at: DateTime<Utc>,
    ) -> bool {
        let mut positions = self.positions.lock().await;
        if let Some(current) = positions.get(&device_id)
            && current.sample.captured_at > sample.captured_at
        {
            return false;
        }
        positions.insert(
            device_id.clone(),
            DevicePosition {
                device_id,
                sample,
                received_at,
            },
        );
        true
    }

    /// All devices sorted by id.
    pub async fn latest_positions(&self) -> Vec<DevicePosition> {
        let positions = self.positions.lock().await;
        let mut list: Vec<DevicePosition> = positions.values().cloned().collect();
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        list
    }
}
