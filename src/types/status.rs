//! Device presence types

use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Derived presence of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// A device together with its current presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
    pub status: PresenceStatus,
}

impl DeviceStatus {
    pub fn new(device_id: impl Into<DeviceId>, status: PresenceStatus) -> Self {
        Self {
            device_id: device_id.into(),
            status,
        }
    }
}
