//! Health and operator endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness, uptime and live connection count |
//! | `GET` | `/api/realtime/stats` | Connections and scope sizes (`ADMIN` only) |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use grid_hub::{Authenticator, HubStats, credential_from};
use grid_types::Role;
use serde::Serialize;

use crate::error::GatewayError;
use crate::state::AppState;

/// Response body of `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` while the hub answers, `degraded` otherwise.
    pub status: &'static str,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Live viewer connections.
    pub connections: usize,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Report liveness. Always 200 so load balancers see the process is up.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, connections) = match state.hub.stats().await {
        Ok(stats) => ("ok", stats.connections),
        Err(_) => ("degraded", 0),
    };

    Json(HealthResponse {
        status,
        timestamp: Utc::now().to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        connections,
    })
}

// ---------------------------------------------------------------------------
// GET /api/realtime/stats
// ---------------------------------------------------------------------------

/// Return connection and scope counts. Requires an `ADMIN` bearer token.
pub async fn realtime_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<HubStats>, GatewayError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let identity = state
        .authenticator
        .verify(credential_from(authorization, None))?;
    Authenticator::require_role(&identity, &[Role::Admin])?;

    let stats = state.hub.stats().await?;
    Ok(Json(stats))
}
