//! Data types for the location hub
//!
//! This module contains the core data structures shared by the hub, the
//! storage layer and the client.

mod connection;
mod location;
mod status;

pub use connection::ConnectionId;
pub use location::{DeviceId, LocationUpdate, Telemetry};
pub use status::{DeviceStatus, PresenceStatus};

/// Result type for top-level hub operations
pub type HubResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
