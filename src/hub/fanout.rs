//! Subscription-filtered fanout
//!
//! A connection receives an event when its subscription set is empty or
//! contains the event's device. Events are queued on each target's outbox in
//! call order, so a single connection never sees two broadcasts reordered.

use std::sync::Arc;

use log::*;

use super::registry::{ConnectionRegistry, Delivery};
use crate::protocol::OutboundMessage;
use crate::types::ConnectionId;

/// Counts from one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Queued for delivery
    pub delivered: usize,
    /// Target closed between snapshot and send
    pub dropped: usize,
    /// Broken or lagging transports, removed from the registry
    pub failed: Vec<ConnectionId>,
}

pub struct FanoutEngine {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every connection interested in `device_id`
    pub fn broadcast(&self, event: &OutboundMessage, device_id: &str) -> FanoutReport {
        let mut report = FanoutReport::default();

        for target in self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| conn.wants(device_id))
        {
            match target.handle.send(event.clone()) {
                Ok(Delivery::Sent) => report.delivered += 1,
                Ok(Delivery::Dropped) => report.dropped += 1,
                Err(e) => {
                    warn!("Fanout to {} failed: {}", target.id, e);
                    report.failed.push(target.id);
                }
            }
        }

        // Cleanup after the loop so one dead peer never blocks the rest
        for id in &report.failed {
            self.registry.unregister(*id);
        }

        trace!(
            "Broadcast for {} delivered to {} connection(s)",
            device_id,
            report.delivered
        );
        report
    }
}
