//! Frame codec
//!
//! Decoding is two-staged: the frame is first parsed as a JSON object and its
//! `type` checked against the known tags, then the typed message is built.
//! This separates unknown-but-valid frames from broken ones.

use serde_json::Value;

use super::{InboundMessage, OutboundMessage};
use crate::error::DecodeError;

/// Decode an inbound frame received by the hub
pub fn decode(frame: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let tag = match value.as_object().map(|obj| obj.get("type")) {
        None => return Err(DecodeError::Malformed("frame is not a JSON object".to_string())),
        Some(None) => return Err(DecodeError::Malformed("missing `type` field".to_string())),
        Some(Some(Value::String(tag))) => tag.clone(),
        Some(Some(other)) => {
            return Err(DecodeError::Malformed(format!(
                "`type` must be a string, got {}",
                other
            )))
        }
    };

    if !InboundMessage::TAGS.contains(&tag.as_str()) {
        return Err(DecodeError::UnknownType(tag));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::Malformed(format!("{}: {}", tag, e)))
}

/// Encode an outbound frame sent by the hub
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Encode a frame sent by a client
pub fn encode_inbound(message: &InboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decode a frame received by a client
pub fn decode_outbound(frame: &str) -> Result<OutboundMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let tag = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        _ => return Err(DecodeError::Malformed("missing `type` field".to_string())),
    };

    if !OutboundMessage::TAGS.contains(&tag.as_str()) {
        return Err(DecodeError::UnknownType(tag));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::Malformed(format!("{}: {}", tag, e)))
}
