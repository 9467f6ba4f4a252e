//! Messages sent by clients to the hub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::coerce;
use crate::types::{DeviceId, LocationUpdate, Telemetry};

/// Every message the hub accepts. `Connect` is implicit in the transport
/// upgrade and has no frame of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    SendLocation(SendLocation),

    JoinDeviceGroup {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
    },

    LeaveDeviceGroup {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
    },

    GetDeviceHistory(HistoryRequest),

    #[serde(rename = "ping")]
    Ping,
}

impl InboundMessage {
    /// Wire tag of the message
    pub fn tag(&self) -> &'static str {
        match self {
            InboundMessage::SendLocation(_) => "SendLocation",
            InboundMessage::JoinDeviceGroup { .. } => "JoinDeviceGroup",
            InboundMessage::LeaveDeviceGroup { .. } => "LeaveDeviceGroup",
            InboundMessage::GetDeviceHistory(_) => "GetDeviceHistory",
            InboundMessage::Ping => "ping",
        }
    }

    pub(crate) const TAGS: [&'static str; 5] = [
        "SendLocation",
        "JoinDeviceGroup",
        "LeaveDeviceGroup",
        "GetDeviceHistory",
        "ping",
    ];
}

/// A position report from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendLocation {
    /// Client-chosen id echoed into the stored update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
    #[serde(alias = "lat", deserialize_with = "coerce::required_f64")]
    pub latitude: f64,
    #[serde(alias = "lng", deserialize_with = "coerce::required_f64")]
    pub longitude: f64,
    #[serde(default, deserialize_with = "coerce::optional_f64")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "coerce::optional_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "coerce::optional_f64")]
    pub heading: Option<f64>,
    #[serde(default, deserialize_with = "coerce::optional_f64")]
    pub altitude: Option<f64>,
    #[serde(
        default,
        deserialize_with = "coerce::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SendLocation {
    pub fn new(device_id: impl Into<DeviceId>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            device_id: device_id.into(),
            latitude,
            longitude,
            accuracy: None,
            speed: None,
            heading: None,
            altitude: None,
            timestamp: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.accuracy = telemetry.accuracy;
        self.speed = telemetry.speed;
        self.heading = telemetry.heading;
        self.altitude = telemetry.altitude;
        self
    }

    /// Build the update the hub stores and broadcasts.
    ///
    /// `received_at` is used when the device did not send its own timestamp.
    pub fn into_update(self, received_at: DateTime<Utc>) -> LocationUpdate {
        let telemetry = Telemetry {
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
            altitude: self.altitude,
        };
        let timestamp = self.timestamp.unwrap_or(received_at);
        let update = LocationUpdate::new(self.device_id, self.latitude, self.longitude, timestamp)
            .with_telemetry(telemetry);

        match self.id {
            Some(id) if !id.trim().is_empty() => update.with_id(id),
            _ => update,
        }
    }
}

/// History query bounds, as sent by the client.
///
/// Bounds stay textual here; they are validated when the query runs so that a
/// bad range yields an empty result instead of a dropped frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    #[serde(default, deserialize_with = "coerce::string_like")]
    pub from: String,
    #[serde(default, deserialize_with = "coerce::string_like")]
    pub to: String,
    /// Restrict the result to a single device
    #[serde(rename = "deviceId", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl HistoryRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            device_id: None,
        }
    }
}
