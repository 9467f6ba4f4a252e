//! REST API module for HTTP endpoints
//!
//! Provides read-only endpoints over stored history and presence:
//! - `GET /api/locations?from=&to=` - Updates in a time range
//! - `GET /api/devices/:device_id/locations` - Latest updates of a device
//! - `GET /api/devices/:device_id/status` - Current presence of a device

pub mod locations;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Limit parameter for device history
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    /// Maximum number of items to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl LimitParams {
    /// Normalize limit to max 1000
    pub fn normalized_limit(&self) -> usize {
        self.limit.min(1000)
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

/// Error half of every REST handler
pub type ApiFailure = (StatusCode, Json<ApiError>);

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> ApiFailure {
        Self::respond(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> ApiFailure {
        Self::respond(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> ApiFailure {
        Self::respond(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    fn respond(status: StatusCode, code: &str, message: impl Into<String>) -> ApiFailure {
        (
            status,
            Json(Self {
                error: message.into(),
                code: code.to_string(),
            }),
        )
    }
}
