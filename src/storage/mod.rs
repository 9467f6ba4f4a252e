//! Storage collaborator
//!
//! The hub persists and queries location history through [`LocationStore`].
//! Implementations provide their own concurrency safety. [`MemoryStore`] is
//! the in-process implementation used by the binary and the tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::types::{LocationUpdate, PresenceStatus};

pub use memory::MemoryStore;

#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Store one update
    async fn persist(&self, update: &LocationUpdate) -> Result<(), StorageError>;

    /// All updates with `from <= timestamp <= to`, oldest first
    async fn query_by_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LocationUpdate>, StorageError>;

    /// Latest `limit` updates of one device, newest first
    async fn query_by_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<LocationUpdate>, StorageError>;

    /// Record a presence transition
    async fn mark_presence(&self, device_id: &str, status: PresenceStatus) -> Result<(), StorageError>;
}
