//! API module for HTTP and WebSocket endpoints
//!
//! The WebSocket endpoint carries the hub protocol; the REST endpoints are
//! thin wrappers over the storage collaborator and the presence tracker.

pub mod http;
pub mod rest;
pub mod websocket;

pub use http::create_router;
pub use websocket::state::AppState;
