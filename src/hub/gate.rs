//! Per-device ordering of presence publication
//!
//! A presence transition is decided, stored and announced while holding its
//! device's gate, so a slow `mark_presence` can never let a later transition
//! overtake an earlier one. Gates are per device: a stalled store delays only
//! the device whose transition is in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::DeviceId;

pub struct DeviceGates {
    gates: Mutex<HashMap<DeviceId, Arc<AsyncMutex<()>>>>,
}

impl DeviceGates {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `device_id`'s presence
    pub async fn lock(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let gate = self
            .gates
            .lock()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        gate.lock_owned().await
    }

    /// Drop the gate of a forgotten device unless someone holds or awaits it
    pub fn forget(&self, device_id: &str) {
        let mut gates = self.gates.lock();
        if gates.get(device_id).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(device_id);
        }
    }

    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.lock().is_empty()
    }
}

impl Default for DeviceGates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_device_is_exclusive() {
        let gates = Arc::new(DeviceGates::new());
        let held = gates.lock("dev-1").await;

        let waiter = {
            let gates = gates.clone();
            tokio::spawn(async move {
                let _gate = gates.lock("dev-1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_devices_are_independent() {
        let gates = DeviceGates::new();
        let _a = gates.lock("dev-1").await;
        let _b = gates.lock("dev-2").await;
        assert_eq!(gates.len(), 2);
    }

    #[tokio::test]
    async fn test_forget_keeps_held_gates() {
        let gates = DeviceGates::new();
        let held = gates.lock("dev-1").await;
        gates.forget("dev-1");
        assert_eq!(gates.len(), 1);

        drop(held);
        gates.forget("dev-1");
        assert!(gates.is_empty());
    }
}
