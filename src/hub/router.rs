//! Inbound message dispatch

use chrono::{DateTime, Utc};
use log::*;

use super::Hub;
use crate::error::{DecodeError, HubError};
use crate::protocol::{codec, HistoryRequest, InboundMessage, OutboundMessage, SendLocation};
use crate::types::{ConnectionId, LocationUpdate};
use crate::utils::time::parse_timestamp;

impl Hub {
    /// Decode and dispatch one text frame. Undecodable frames are logged
    /// and dropped; the connection stays open.
    pub async fn handle_frame(&self, connection_id: ConnectionId, frame: &str) {
        match codec::decode(frame) {
            Ok(message) => self.dispatch(connection_id, message).await,
            Err(DecodeError::UnknownType(tag)) => {
                debug!("Ignoring unknown message type `{}` from {}", tag, connection_id);
            }
            Err(e) => warn!("Dropping frame from {}: {}", connection_id, e),
        }
    }

    /// Run the handler for a decoded message
    pub async fn dispatch(&self, connection_id: ConnectionId, message: InboundMessage) {
        trace!("{} -> {}", connection_id, message.tag());
        match message {
            InboundMessage::SendLocation(report) => {
                self.on_send_location(connection_id, report).await;
            }
            InboundMessage::JoinDeviceGroup { device_id } => {
                if self.registry.subscribe(connection_id, &device_id) {
                    debug!("{} joined group {}", connection_id, device_id);
                }
            }
            InboundMessage::LeaveDeviceGroup { device_id } => {
                if self.registry.unsubscribe(connection_id, &device_id) {
                    debug!("{} left group {}", connection_id, device_id);
                }
            }
            InboundMessage::GetDeviceHistory(request) => {
                self.on_history(connection_id, request).await;
            }
            InboundMessage::Ping => self.reply(connection_id, OutboundMessage::Pong),
        }
    }

    async fn on_send_location(&self, connection_id: ConnectionId, report: SendLocation) {
        let received_at = Utc::now();
        let update = report.into_update(received_at);

        // A failed write does not hold back the live broadcast
        if let Err(e) = self.store.persist(&update).await {
            warn!("Failed to persist update {}: {}", update.id, e);
        }

        {
            let _gate = self.gates.lock(&update.device_id).await;
            if let Some(status) = self
                .presence
                .record_activity(&update.device_id, connection_id, received_at)
            {
                self.publish_status(status).await;
            }
        }

        let device_id = update.device_id.clone();
        self.broadcast(&OutboundMessage::ReceiveLocation(update), &device_id);
    }

    async fn on_history(&self, connection_id: ConnectionId, request: HistoryRequest) {
        let reply = match self.history(&request).await {
            Ok(locations) => OutboundMessage::ReceiveLocations { locations },
            Err(HubError::InvalidRange(reason)) => {
                debug!("History request from {} rejected: {}", connection_id, reason);
                OutboundMessage::ReceiveLocations { locations: Vec::new() }
            }
            Err(e) => {
                error!("History query for {} failed: {}", connection_id, e);
                OutboundMessage::error("storage_error", "location history is unavailable")
            }
        };
        self.reply(connection_id, reply);
    }

    /// Run a history query: validate the bounds, query storage and apply the
    /// optional device filter
    pub async fn history(&self, request: &HistoryRequest) -> Result<Vec<LocationUpdate>, HubError> {
        let (from, to) = parse_range(&request.from, &request.to)?;
        let mut locations = self.store.query_by_range(from, to).await?;
        if let Some(device_id) = &request.device_id {
            locations.retain(|update| &update.device_id == device_id);
        }
        Ok(locations)
    }

    fn reply(&self, connection_id: ConnectionId, message: OutboundMessage) {
        if let Err(e) = self.registry.send_to(connection_id, message) {
            debug!("Reply to {} not delivered: {}", connection_id, e);
        }
    }
}

/// Parse and validate `[from, to]` history bounds
pub fn parse_range(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), HubError> {
    let start = parse_timestamp(from)
        .ok_or_else(|| HubError::InvalidRange(format!("unparsable `from`: {:?}", from)))?;
    let end = parse_timestamp(to)
        .ok_or_else(|| HubError::InvalidRange(format!("unparsable `to`: {:?}", to)))?;

    if end < start {
        return Err(HubError::InvalidRange(format!("`to` {} is before `from` {}", end, start)));
    }
    Ok((start, end))
}
