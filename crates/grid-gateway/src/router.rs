//! Axum router construction for the gateway.
//!
//! Assembles the viewer socket, the ingest endpoints and the health
//! endpoints into a single [`Router`] with CORS and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;
use crate::{handlers, ingest, ws};

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /ws` -- authenticated viewer `WebSocket`
/// - `POST /internal/entity-update` -- tracking batch ingest
/// - `POST /internal/anomaly` -- anomaly ingest
/// - `POST /internal/session-stats` -- session statistics ingest
/// - `POST /internal/node-status` -- node status ingest
/// - `POST /internal/sensor-frame` -- sensor frame ingest
/// - `GET /health` -- liveness
/// - `GET /api/realtime/stats` -- hub statistics (`ADMIN`)
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origin);

    Router::new()
        // Viewer socket
        .route("/ws", get(ws::viewer_socket))
        // Producer ingest
        .route("/internal/entity-update", post(ingest::entity_update))
        .route("/internal/anomaly", post(ingest::anomaly))
        .route("/internal/session-stats", post(ingest::session_stats))
        .route("/internal/node-status", post(ingest::node_status))
        .route("/internal/sensor-frame", post(ingest::sensor_frame))
        // Health and stats
        .route("/health", get(handlers::health))
        .route("/api/realtime/stats", get(handlers::realtime_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the dashboard origin. An origin that is not a valid header
/// value allows no cross-origin requests.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            warn!(origin, error = %e, "Invalid CORS origin; cross-origin requests disabled");
            layer
        }
    }
}
