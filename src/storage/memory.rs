//! In-memory location store

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::LocationStore;
use crate::error::StorageError;
use crate::types::{DeviceId, LocationUpdate, PresenceStatus};

/// Default number of updates kept before the oldest are evicted
pub const DEFAULT_RETENTION: usize = 100_000;

/// Bounded in-memory history with presence bookkeeping
pub struct MemoryStore {
    updates: RwLock<VecDeque<LocationUpdate>>,
    presence: RwLock<HashMap<DeviceId, PresenceStatus>>,
    retention: usize,
}

impl MemoryStore {
    /// Create a store with the default retention
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Create a store keeping at most `retention` updates
    pub fn with_retention(retention: usize) -> Self {
        Self {
            updates: RwLock::new(VecDeque::new()),
            presence: RwLock::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    /// Number of stored updates
    pub fn len(&self) -> usize {
        self.updates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.read().is_empty()
    }

    /// Last presence recorded for a device
    pub fn presence(&self, device_id: &str) -> Option<PresenceStatus> {
        self.presence.read().get(device_id).copied()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn persist(&self, update: &LocationUpdate) -> Result<(), StorageError> {
        let mut updates = self.updates.write();
        if updates.len() >= self.retention {
            updates.pop_front();
        }
        updates.push_back(update.clone());
        Ok(())
    }

    async fn query_by_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LocationUpdate>, StorageError> {
        let mut found: Vec<LocationUpdate> = self
            .updates
            .read()
            .iter()
            .filter(|u| u.timestamp >= from && u.timestamp <= to)
            .cloned()
            .collect();
        found.sort_by_key(|u| u.timestamp);
        Ok(found)
    }

    async fn query_by_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<LocationUpdate>, StorageError> {
        let mut found: Vec<LocationUpdate> = self
            .updates
            .read()
            .iter()
            .filter(|u| u.device_id == device_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }

    async fn mark_presence(&self, device_id: &str, status: PresenceStatus) -> Result<(), StorageError> {
        self.presence.write().insert(device_id.to_string(), status);
        Ok(())
    }
}
