//! WebSocket module for real-time location updates
//!
//! Provides the hub endpoint (default `/hubs/location`). Each socket is
//! split into a reader that decodes and routes frames and a writer that
//! drains the connection's outbox.

pub mod handler;
pub mod state;

pub use handler::{handle_socket, ws_handler};
