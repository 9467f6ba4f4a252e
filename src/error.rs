//! Error types for the hub
//!
//! None of these are process-fatal: every variant is handled at the
//! connection or message boundary and the hub keeps serving.

use thiserror::Error;

use crate::types::ConnectionId;

/// Errors produced while decoding an inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, not an object, no string `type`, or bad required fields
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Well-formed frame carrying a tag the hub does not handle
    #[error("unknown message type `{0}`")]
    UnknownType(String),
}

/// Errors reported by a storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Errors raised while handling a single message or connection
#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid history range: {0}")]
    InvalidRange(String),

    #[error("transport closed for {0}")]
    Transport(ConnectionId),

    #[error("outbox full for {0}")]
    Lagged(ConnectionId),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HubError {
    /// The connection this error takes down, if any
    pub fn lost_connection(&self) -> Option<ConnectionId> {
        match self {
            HubError::Transport(id) | HubError::Lagged(id) => Some(*id),
            _ => None,
        }
    }
}
