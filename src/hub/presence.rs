//! Device presence tracking
//!
//! Presence is derived from traffic: a location report makes a device
//! online, and a device goes offline when every connection that reported it
//! has closed or when it idles past a configured timeout. Only transitions
//! are returned, so callers emit one `DeviceStatusChanged` per change rather
//! than one per update.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::{ConnectionId, DeviceId, DeviceStatus, PresenceStatus};

struct PresenceEntry {
    status: PresenceStatus,
    last_seen: DateTime<Utc>,
    reporters: HashSet<ConnectionId>,
}

pub struct PresenceTracker {
    devices: Mutex<HashMap<DeviceId, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Record a report for `device_id` arriving on `connection_id`.
    /// Returns the transition when the device was unknown or offline.
    pub fn record_activity(
        &self,
        device_id: &str,
        connection_id: ConnectionId,
        at: DateTime<Utc>,
    ) -> Option<DeviceStatus> {
        let mut devices = self.devices.lock();
        match devices.get_mut(device_id) {
            Some(entry) => {
                entry.reporters.insert(connection_id);
                if at > entry.last_seen {
                    entry.last_seen = at;
                }
                if entry.status == PresenceStatus::Online {
                    return None;
                }
                entry.status = PresenceStatus::Online;
            }
            None => {
                devices.insert(
                    device_id.to_string(),
                    PresenceEntry {
                        status: PresenceStatus::Online,
                        last_seen: at,
                        reporters: HashSet::from([connection_id]),
                    },
                );
            }
        }
        Some(DeviceStatus::new(device_id, PresenceStatus::Online))
    }

    /// Devices `connection_id` has reported for
    pub fn reported_by(&self, connection_id: ConnectionId) -> Vec<DeviceId> {
        self.devices
            .lock()
            .iter()
            .filter(|(_, entry)| entry.reporters.contains(&connection_id))
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }

    /// Forget `connection_id` as a reporter of `device_id`. The device goes
    /// offline when no live reporter is left.
    pub fn release(&self, device_id: &str, connection_id: ConnectionId) -> Option<DeviceStatus> {
        let mut devices = self.devices.lock();
        let entry = devices.get_mut(device_id)?;
        if !entry.reporters.remove(&connection_id) || !entry.reporters.is_empty() {
            return None;
        }
        if entry.status == PresenceStatus::Offline {
            return None;
        }
        entry.status = PresenceStatus::Offline;
        Some(DeviceStatus::new(device_id, PresenceStatus::Offline))
    }

    /// Online devices not seen within `idle` of `now`
    pub fn idle_devices(&self, now: DateTime<Utc>, idle: Duration) -> Vec<DeviceId> {
        self.devices
            .lock()
            .iter()
            .filter(|(_, entry)| entry.status == PresenceStatus::Online && idle_for(entry, now) > idle)
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }

    /// Mark `device_id` offline if it is still idle past `idle`
    pub fn expire_idle(&self, device_id: &str, now: DateTime<Utc>, idle: Duration) -> Option<DeviceStatus> {
        let mut devices = self.devices.lock();
        let entry = devices.get_mut(device_id)?;
        if entry.status != PresenceStatus::Online || idle_for(entry, now) <= idle {
            return None;
        }
        entry.status = PresenceStatus::Offline;
        entry.reporters.clear();
        Some(DeviceStatus::new(device_id, PresenceStatus::Offline))
    }

    /// Forget offline devices last seen more than `retention` before `now`
    pub fn prune_offline(&self, now: DateTime<Utc>, retention: Duration) -> Vec<DeviceId> {
        let mut pruned = Vec::new();
        self.devices.lock().retain(|device_id, entry| {
            let keep = entry.status == PresenceStatus::Online || idle_for(entry, now) <= retention;
            if !keep {
                pruned.push(device_id.clone());
            }
            keep
        });
        pruned
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Current status, `None` for devices never seen
    pub fn status(&self, device_id: &str) -> Option<PresenceStatus> {
        self.devices.lock().get(device_id).map(|entry| entry.status)
    }

    /// When the device last reported
    pub fn last_seen(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.devices.lock().get(device_id).map(|entry| entry.last_seen)
    }

    pub fn online_devices(&self) -> Vec<DeviceId> {
        let mut online: Vec<DeviceId> = self
            .devices
            .lock()
            .iter()
            .filter(|(_, entry)| entry.status == PresenceStatus::Online)
            .map(|(id, _)| id.clone())
            .collect();
        online.sort();
        online
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn idle_for(entry: &PresenceEntry, now: DateTime<Utc>) -> Duration {
    (now - entry.last_seen).to_std().unwrap_or(Duration::ZERO)
}
