//! Location history and presence endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use log::*;
use serde::Deserialize;

use super::{ApiError, ApiFailure, LimitParams};
use crate::api::AppState;
use crate::error::HubError;
use crate::hub::parse_range;
use crate::types::{DeviceStatus, LocationUpdate};

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// GET /api/locations?from=&to=
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<LocationUpdate>>, ApiFailure> {
    let (from, to) = parse_range(&params.from, &params.to).map_err(|e| match e {
        HubError::InvalidRange(reason) => ApiError::bad_request(reason),
        other => ApiError::internal(other.to_string()),
    })?;

    state
        .hub
        .store()
        .query_by_range(from, to)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Range query failed: {}", e);
            ApiError::internal("location history is unavailable")
        })
}

/// GET /api/devices/:device_id/locations?limit=
pub async fn device_locations(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<LocationUpdate>>, ApiFailure> {
    state
        .hub
        .store()
        .query_by_device(&device_id, params.normalized_limit())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Device query for {} failed: {}", device_id, e);
            ApiError::internal("location history is unavailable")
        })
}

/// GET /api/devices/:device_id/status
pub async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatus>, ApiFailure> {
    match state.hub.presence().status(&device_id) {
        Some(status) => Ok(Json(DeviceStatus::new(device_id, status))),
        None => Err(ApiError::not_found(format!("Device '{}' has never reported", device_id))),
    }
}
