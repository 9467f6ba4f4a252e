//! Location broadcast hub
//!
//! The [`Hub`] is an explicitly constructed service object: it owns the
//! connection registry, the fanout engine and the presence tracker, and
//! holds the storage collaborator. Transports call [`Hub::accept`] when a
//! connection opens, [`Hub::handle_frame`] for each text frame and
//! [`Hub::disconnect`] when it closes.
//!
//! ## Components
//! - `registry`: live connections and their group subscriptions
//! - `fanout`: subscription-filtered broadcast
//! - `presence`: online/offline derivation
//! - `gate`: per-device ordering of presence publication
//! - `router`: per-message handlers

pub mod fanout;
pub mod gate;
pub mod presence;
pub mod registry;
mod router;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::*;

use crate::protocol::OutboundMessage;
use crate::storage::LocationStore;
use crate::types::{ConnectionId, DeviceStatus};

pub use fanout::{FanoutEngine, FanoutReport};
pub use gate::DeviceGates;
pub use presence::PresenceTracker;
pub use registry::{
    ConnectionHandle, ConnectionRegistry, ConnectionSnapshot, Delivery, Outbox, DEFAULT_OUTBOX_CAPACITY,
};
pub use router::parse_range;

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    fanout: FanoutEngine,
    presence: PresenceTracker,
    gates: DeviceGates,
    store: Arc<dyn LocationStore>,
}

impl Hub {
    /// Create a hub backed by `store`
    pub fn new(store: Arc<dyn LocationStore>) -> Self {
        Self::with_outbox_capacity(store, DEFAULT_OUTBOX_CAPACITY)
    }

    /// Create a hub whose connections buffer at most `capacity` outbound
    /// messages before they are dropped as lagging
    pub fn with_outbox_capacity(store: Arc<dyn LocationStore>, capacity: usize) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_capacity(capacity));
        Self {
            fanout: FanoutEngine::new(registry.clone()),
            registry,
            presence: PresenceTracker::new(),
            gates: DeviceGates::new(),
            store,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn store(&self) -> &Arc<dyn LocationStore> {
        &self.store
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a freshly opened connection and greet it with `connected`
    pub fn accept(&self) -> (ConnectionId, Outbox) {
        let (id, outbox) = self.registry.register();
        let _ = self
            .registry
            .send_to(id, OutboundMessage::Connected { connection_id: id });
        info!("Connection {} opened ({} live)", id, self.registry.len());
        (id, outbox)
    }

    /// Tear down a connection. Safe to call more than once.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.unregister(id) {
            info!("Connection {} closed ({} live)", id, self.registry.len());
        }

        for device_id in self.presence.reported_by(id) {
            let _gate = self.gates.lock(&device_id).await;
            if let Some(status) = self.presence.release(&device_id, id) {
                self.publish_status(status).await;
            }
        }
    }

    /// Deliver an event to every connection interested in `device_id`
    pub fn broadcast(&self, event: &OutboundMessage, device_id: &str) -> FanoutReport {
        self.fanout.broadcast(event, device_id)
    }

    /// Apply the idle-timeout offline policy. Returns how many devices went offline.
    pub async fn expire_idle_devices(&self, idle: Duration) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for device_id in self.presence.idle_devices(now, idle) {
            let _gate = self.gates.lock(&device_id).await;
            if let Some(status) = self.presence.expire_idle(&device_id, now, idle) {
                self.publish_status(status).await;
                count += 1;
            }
        }
        count
    }

    /// Forget offline devices not seen for `retention`. Returns how many
    /// were dropped.
    pub fn prune_devices(&self, retention: Duration) -> usize {
        let pruned = self.presence.prune_offline(Utc::now(), retention);
        for device_id in &pruned {
            self.gates.forget(device_id);
        }
        pruned.len()
    }

    /// Close every connection
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.clear();
        info!("Hub shut down, closed {} connection(s)", closed);
        closed
    }

    /// Persist a presence transition and announce it. Callers hold the
    /// device's gate from the decision until this returns.
    async fn publish_status(&self, status: DeviceStatus) {
        if let Err(e) = self
            .store
            .mark_presence(&status.device_id, status.status)
            .await
        {
            warn!(
                "Failed to record {} as {}: {}",
                status.device_id,
                status.status.as_str(),
                e
            );
        }

        debug!("Device {} is now {}", status.device_id, status.status.as_str());
        let event = OutboundMessage::DeviceStatusChanged {
            device_id: status.device_id.clone(),
            status: status.status,
        };
        self.fanout.broadcast(&event, &status.device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::PresenceStatus;

    #[tokio::test]
    async fn test_prune_forgets_offline_devices() {
        let hub = Hub::new(Arc::new(MemoryStore::new()));
        let (device, _rx) = hub.accept();
        hub.handle_frame(device, r#"{"type":"SendLocation","deviceId":"dev-1","lat":1,"lng":1}"#)
            .await;

        // Online devices are never pruned
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hub.prune_devices(Duration::from_millis(1)), 0);

        hub.disconnect(device).await;
        assert_eq!(hub.presence().status("dev-1"), Some(PresenceStatus::Offline));
        assert_eq!(hub.prune_devices(Duration::from_millis(1)), 1);
        assert_eq!(hub.presence().status("dev-1"), None);
        assert!(hub.gates.is_empty());
    }
}
