//! Consumer-side hub client
//!
//! [`LocationClient`] owns one logical connection to the hub and keeps it
//! alive: an unexpected drop is retried with bounded exponential backoff,
//! and group subscriptions are replayed after every successful reconnect.
//!
//! The transport is abstracted by [`Connector`] and [`Link`] so the state
//! machine can run against the real WebSocket ([`WsConnector`]) or an
//! in-memory link in tests.

mod backoff;
mod controller;
mod observer;
mod transport;

use thiserror::Error;

use crate::error::DecodeError;

pub use backoff::ReconnectConfig;
pub use controller::{ClientEvent, ConnectionState, LocationClient};
pub use observer::{Listener, Observers, Subscription};
pub use transport::{Connector, Link, WsConnector, WsLink};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("client is already {0}")]
    AlreadyActive(&'static str),

    #[error("client was closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
