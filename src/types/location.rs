//! Location update payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::update_id;

/// Identifier of a tracked device
pub type DeviceId = String;

/// A single position report for a device.
///
/// Optional telemetry fields serialize as `null` when absent so that a missing
/// reading is never confused with a zero reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub id: String,
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Optional readings that may accompany a position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
}

impl LocationUpdate {
    /// Create an update with a hub-assigned id and no telemetry
    pub fn new(device_id: impl Into<DeviceId>, latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        let device_id = device_id.into();
        Self {
            id: update_id(&device_id, timestamp),
            device_id,
            latitude,
            longitude,
            timestamp,
            accuracy: None,
            speed: None,
            heading: None,
            altitude: None,
        }
    }

    /// Replace the id, e.g. with one echoed from the client
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach optional telemetry readings
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.accuracy = telemetry.accuracy;
        self.speed = telemetry.speed;
        self.heading = telemetry.heading;
        self.altitude = telemetry.altitude;
        self
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
            altitude: self.altitude,
        }
    }

    /// True when the coordinates fall inside the valid WGS84 ranges.
    /// The hub itself does not reject out-of-range positions.
    pub fn has_valid_coordinates(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}
