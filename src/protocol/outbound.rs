//! Messages sent by the hub to clients

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, DeviceId, LocationUpdate, PresenceStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// First frame on every connection
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },

    /// A single broadcast update, fields inlined next to `type`
    ReceiveLocation(LocationUpdate),

    /// Reply to a history request
    ReceiveLocations { locations: Vec<LocationUpdate> },

    DeviceStatusChanged {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        status: PresenceStatus,
    },

    #[serde(rename = "pong")]
    Pong,

    /// Best-effort failure notice for a direct request
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl OutboundMessage {
    pub(crate) const TAGS: [&'static str; 6] = [
        "connected",
        "ReceiveLocation",
        "ReceiveLocations",
        "DeviceStatusChanged",
        "pong",
        "error",
    ];

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Device the message is about, if any
    pub fn device_id(&self) -> Option<&str> {
        match self {
            OutboundMessage::ReceiveLocation(update) => Some(&update.device_id),
            OutboundMessage::DeviceStatusChanged { device_id, .. } => Some(device_id),
            _ => None,
        }
    }
}
