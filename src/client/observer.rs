//! Observer registration with unsubscribe handles

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Callback invoked for every emitted event
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ObserverTable<E> {
    next_id: u64,
    listeners: BTreeMap<u64, Listener<E>>,
}

/// A set of listeners for events of type `E`
pub struct Observers<E> {
    table: Arc<Mutex<ObserverTable<E>>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ObserverTable {
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned handle is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, listener: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.insert(id, Arc::new(listener));
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Deliver `event` to every listener in registration order. Listeners
    /// run outside the lock and may unsubscribe themselves.
    pub fn notify(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self.table.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that removes its listener when dropped
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription<E> {
    id: u64,
    table: Weak<Mutex<ObserverTable<E>>>,
}

impl<E> Subscription<E> {
    pub fn unsubscribe(self) {}

    /// Keep the listener registered for the lifetime of the observers
    pub fn detach(mut self) {
        self.table = Weak::new();
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().listeners.remove(&self.id);
        }
    }
}
