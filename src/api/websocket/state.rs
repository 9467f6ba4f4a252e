//! WebSocket application state

use std::sync::Arc;

use crate::hub::Hub;

/// Shared application state for HTTP and WebSocket handlers
pub struct AppState {
    /// The broadcast hub
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}
