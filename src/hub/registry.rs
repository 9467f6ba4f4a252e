//! Connection registry
//!
//! The registry is the only owner of live connections and their group
//! subscriptions. Everything else reaches a connection through its id, so an
//! entry can be invalidated without leaving dangling senders behind.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::*;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

use crate::error::HubError;
use crate::protocol::OutboundMessage;
use crate::types::{ConnectionId, DeviceId};

/// Messages a connection may have queued before it counts as lagging
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Receiving half of a connection's outbound queue, drained by its writer task
pub type Outbox = Receiver<OutboundMessage>;

/// Outcome of a single send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the connection's writer
    Sent,
    /// The connection was already closed, message silently discarded
    Dropped,
}

/// Sending half of a connection's outbound queue.
///
/// The open flag and the enqueue share one lock: once the connection is
/// unregistered, no clone of its handle can queue anything more.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: Sender<OutboundMessage>,
    open: Arc<Mutex<bool>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Queue a message without waiting. Sending on a handle whose connection
    /// has been unregistered is not an error and yields [`Delivery::Dropped`];
    /// a full outbox is [`HubError::Lagged`].
    pub fn send(&self, message: OutboundMessage) -> Result<Delivery, HubError> {
        let open = self.open.lock();
        if !*open {
            return Ok(Delivery::Dropped);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(Delivery::Sent),
            Err(TrySendError::Full(_)) => Err(HubError::Lagged(self.id)),
            Err(TrySendError::Closed(_)) => Err(HubError::Transport(self.id)),
        }
    }

    fn close(&self) {
        *self.open.lock() = false;
    }
}

struct ConnectionEntry {
    subscriptions: HashSet<DeviceId>,
    handle: ConnectionHandle,
}

/// Point-in-time copy of one connection
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub subscriptions: HashSet<DeviceId>,
    pub handle: ConnectionHandle,
}

impl ConnectionSnapshot {
    /// An empty subscription set means "receive everything"
    pub fn wants(&self, device_id: &str) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.contains(device_id)
    }
}

/// Registry of live connections, linearized by a single lock
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    /// Registry whose connections each buffer at most `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new connection and return its id with the outbox its
    /// writer drains
    pub fn register(&self) -> (ConnectionId, Outbox) {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = ConnectionHandle {
            id,
            tx,
            open: Arc::new(Mutex::new(true)),
        };

        self.connections.write().insert(
            id,
            ConnectionEntry {
                subscriptions: HashSet::new(),
                handle,
            },
        );
        debug!("Registered connection {}", id);
        (id, rx)
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id);
        match removed {
            Some(entry) => {
                entry.handle.close();
                debug!("Unregistered connection {}", id);
                true
            }
            None => false,
        }
    }

    /// Join a device group. Returns true if the subscription is new.
    pub fn subscribe(&self, id: ConnectionId, device_id: &str) -> bool {
        match self.connections.write().get_mut(&id) {
            Some(entry) => entry.subscriptions.insert(device_id.to_string()),
            None => false,
        }
    }

    /// Leave a device group. Returns true if a subscription was removed.
    pub fn unsubscribe(&self, id: ConnectionId, device_id: &str) -> bool {
        match self.connections.write().get_mut(&id) {
            Some(entry) => entry.subscriptions.remove(device_id),
            None => false,
        }
    }

    /// Consistent copy of every live connection
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .read()
            .iter()
            .map(|(id, entry)| ConnectionSnapshot {
                id: *id,
                subscriptions: entry.subscriptions.clone(),
                handle: entry.handle.clone(),
            })
            .collect()
    }

    /// Subscriptions of one connection
    pub fn subscriptions(&self, id: ConnectionId) -> Option<HashSet<DeviceId>> {
        self.connections
            .read()
            .get(&id)
            .map(|entry| entry.subscriptions.clone())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Send directly to one connection. A broken or lagging transport
    /// unregisters it.
    pub fn send_to(&self, id: ConnectionId, message: OutboundMessage) -> Result<Delivery, HubError> {
        let result = match self.connections.read().get(&id) {
            Some(entry) => entry.handle.send(message),
            None => Ok(Delivery::Dropped),
        };

        if let Err(e) = &result {
            if let Some(dead) = e.lost_connection() {
                warn!("Send to {} failed ({}), connection will be cleaned up", dead, e);
                self.unregister(dead);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Close and drop every connection. Writers see their outbox end.
    pub fn clear(&self) -> usize {
        let drained: Vec<ConnectionEntry> = self.connections.write().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.handle.close();
        }
        drained.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
