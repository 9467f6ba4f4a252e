//! Location Hub
//!
//! A real-time location broadcast hub. Devices report their position over a
//! persistent WebSocket connection; the hub stores each report and fans it
//! out to every consumer watching that device.
//!
//! # Features
//!
//! - **Device groups**: consumers join per-device groups; a connection with
//!   no groups receives everything
//! - **Presence**: online/offline transitions derived from reports and
//!   disconnects
//! - **History**: time-range and per-device queries over WebSocket and HTTP
//! - **Client**: reconnecting consumer with bounded exponential backoff
//!
//! # Modules
//!
//! - `types`: Core data structures (LocationUpdate, DeviceStatus, ConnectionId)
//! - `protocol`: JSON wire messages and the codec
//! - `hub`: Connection registry, fanout, presence and message routing
//! - `storage`: Storage trait and the in-memory store
//! - `api`: WebSocket endpoint and HTTP routes
//! - `client`: Reconnecting hub client
//! - `config`: Environment configuration
//! - `server`: Service bootstrap
//! - `utils`: Utility functions (timestamps, ids)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use location_hub::{server, HubConfig, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> location_hub::types::HubResult<()> {
//!     let config = HubConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     server::run(config, store).await
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use client::{ClientEvent, ConnectionState, LocationClient, ReconnectConfig, WsConnector};
pub use config::HubConfig;
pub use error::{DecodeError, HubError, StorageError};
pub use hub::Hub;
pub use protocol::{HistoryRequest, InboundMessage, OutboundMessage, SendLocation};
pub use storage::{LocationStore, MemoryStore};
pub use types::{ConnectionId, DeviceId, DeviceStatus, LocationUpdate, PresenceStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
