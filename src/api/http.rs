//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use super::rest::locations;
use super::websocket::{handler::ws_handler, state::AppState};

/// Create the Axum router with the hub endpoint mounted at `ws_path`
pub fn create_router(state: Arc<AppState>, ws_path: &str) -> Router {
    // CORS configuration - the map front end is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket endpoint
        .route(ws_path, get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        // REST API endpoints
        .route("/api/locations", get(locations::list_locations))
        .route("/api/devices/:device_id/locations", get(locations::device_locations))
        .route("/api/devices/:device_id/status", get(locations::device_status))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::storage::{LocationStore, MemoryStore};
    use crate::types::{ConnectionId, LocationUpdate};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use tower::util::ServiceExt;

    fn app() -> (Router, Arc<Hub>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(Hub::new(store.clone()));
        let router = create_router(Arc::new(AppState::new(hub.clone())), "/hubs/location");
        (router, hub, store)
    }

    async fn get_status(app: Router, uri: &str) -> u16 {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _, _) = app();
        assert_eq!(get_status(app, "/health").await, 200);
    }

    #[tokio::test]
    async fn test_range_endpoint() {
        let (app, _, store) = app();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        store.persist(&LocationUpdate::new("dev-1", 1.0, 2.0, at)).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/locations?from=2024-01-01&to=2024-01-02")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let found: Vec<LocationUpdate> = serde_json::from_slice(&body).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_id, "dev-1");
    }

    #[tokio::test]
    async fn test_reversed_range_is_bad_request() {
        let (app, _, _) = app();
        assert_eq!(
            get_status(app, "/api/locations?from=2024-02-01&to=2024-01-01").await,
            400
        );
    }

    #[tokio::test]
    async fn test_device_status_endpoint() {
        let (app, hub, _) = app();
        assert_eq!(get_status(app.clone(), "/api/devices/dev-1/status").await, 404);

        hub.presence()
            .record_activity("dev-1", ConnectionId::new(1), Utc::now());
        assert_eq!(get_status(app, "/api/devices/dev-1/status").await, 200);
    }
}
