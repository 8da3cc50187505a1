//! Stable device identifier.
//!
//! The id is generated once per installation and persisted in a small text
//! file so every session reports under the same `deviceId`.

use std::{fs, io, path::Path};

use livetrack_shared::wire::DeviceId;
use uuid::Uuid;

use crate::error::ClientError;

/// Default location of the device id file, relative to the working directory.
pub const DEFAULT_DEVICE_ID_FILE: &str = ".livetrack-device-id";

/// Read the persisted device id, creating and storing a new one if missing.
pub fn load_or_create_device_id(path: &Path) -> Result<DeviceId, ClientError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            DeviceId::new(content).map_err(|_| ClientError::EmptyDeviceIdFile(path.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let generated = Uuid::new_v4().to_string();
            persist(path, &generated).map_err(|source| ClientError::DeviceIdFile {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!("Generated device id {} ({})", generated, path.display());
            DeviceId::new(generated).map_err(|_| ClientError::EmptyDeviceIdFile(path.to_path_buf()))
        }
        Err(source) => Err(ClientError::DeviceIdFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn persist(path: &Path, device_id: &str) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", device_id))
}
