//! Ingest Gateway.
//!
//! Producer-facing endpoints. Each call decodes one payload, resolves its
//! target scope, hands a [`ViewerEvent`] to the hub and answers
//! `{"status":"ok"}` whether or not any viewer was listening. A body that
//! does not decode is answered with 400 and publishes nothing.
//!
//! These routes sit on the internal trust boundary and carry no viewer
//! credential.
//!
//! # Endpoints
//!
//! | Method | Path | Event | Target |
//! |--------|------|-------|--------|
//! | `POST` | `/internal/entity-update` | `entity:tracking` | `session:<sessionId>` or all |
//! | `POST` | `/internal/anomaly` | `anomaly:detected` | `session:<sessionId>` or all |
//! | `POST` | `/internal/session-stats` | `session:stats` | `session:<sessionId>` or all |
//! | `POST` | `/internal/node-status` | `node:status` | `node:<nodeId>` |
//! | `POST` | `/internal/sensor-frame` | `sensor:frame` | `node:<nodeId>`, else `session:<sessionId>`, else all |

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use grid_types::events::present_value;
use grid_types::{AnomalyRecord, EntityTracking, ScopeName, ViewerEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::GatewayError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /internal/entity-update`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdateRequest {
    /// Session the frame belongs to; absent broadcasts.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Entities in this frame, passed through.
    pub entities: Vec<Value>,
    /// Producer frame statistics, passed through (`null` included).
    #[serde(default, deserialize_with = "present_value")]
    pub stats: Option<Value>,
    /// Producer send time, epoch seconds.
    #[serde(default)]
    pub sent_at: Option<f64>,
}

/// Body of `POST /internal/anomaly`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRequest {
    /// Session the anomaly belongs to; absent broadcasts.
    #[serde(default)]
    pub session_id: Option<String>,
    /// The anomaly record, passed through. Must be a JSON object.
    pub anomaly: AnomalyRecord,
}

/// Body of `POST /internal/session-stats`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatsRequest {
    /// Session the statistics describe; absent broadcasts.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Aggregated statistics, passed through.
    pub stats: Value,
}

/// Body of `POST /internal/node-status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusRequest {
    /// Node reporting its status.
    pub node_id: String,
    /// Status payload, passed through.
    pub status: Value,
}

/// Body of `POST /internal/sensor-frame`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorFrameRequest {
    /// Session the frame belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Node that captured the frame.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Frame payload, passed through.
    pub frame: Value,
}

/// Ingestion acknowledgement.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    /// Always `"ok"`.
    pub status: &'static str,
}

const ACK: IngestAck = IngestAck { status: "ok" };

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Producer-to-dispatch latency in whole milliseconds.
///
/// `round((now - sent_at) * 1000)`, clamped to `0` when `sent_at` is
/// absent, in the future or not a finite number.
pub fn latency_ms(sent_at: Option<f64>, now_secs: f64) -> u64 {
    let Some(sent_at) = sent_at else {
        return 0;
    };
    let millis = ((now_secs - sent_at) * 1000.0).round();
    if !millis.is_finite() || millis <= 0.0 {
        return 0;
    }
    whole_millis(millis)
}

/// `as` saturates at `u64::MAX`; callers pass finite positive values.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn whole_millis(millis: f64) -> u64 {
    millis as u64
}

/// Current wall-clock time as fractional epoch seconds.
fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

/// `session:<id>` when `id` is present and non-blank.
fn session_scope(id: Option<String>) -> Option<ScopeName> {
    id.and_then(|id| ScopeName::session(id).ok())
}

/// `node:<id>` when `id` is present and non-blank.
fn node_scope(id: Option<String>) -> Option<ScopeName> {
    id.and_then(|id| ScopeName::node(id).ok())
}

async fn publish(
    state: &AppState,
    event: &ViewerEvent,
    scope: Option<ScopeName>,
) -> Result<Json<IngestAck>, GatewayError> {
    let report = state.hub.publish_event(event, scope).await?;
    debug!(
        event = event.name(),
        recipients = report.recipients,
        delivered = report.delivered,
        "Ingested"
    );
    Ok(Json(ACK))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /internal/entity-update` -- publish an `entity:tracking` batch.
pub async fn entity_update(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EntityUpdateRequest>, JsonRejection>,
) -> Result<Json<IngestAck>, GatewayError> {
    let Json(body) = body?;
    let event = ViewerEvent::EntityTracking(EntityTracking {
        entities: body.entities,
        stats: body.stats,
        latency_ms: latency_ms(body.sent_at, now_epoch_secs()),
    });
    publish(&state, &event, session_scope(body.session_id)).await
}

/// `POST /internal/anomaly` -- publish an `anomaly:detected` record.
pub async fn anomaly(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnomalyRequest>, JsonRejection>,
) -> Result<Json<IngestAck>, GatewayError> {
    let Json(body) = body?;
    debug!(anomaly_id = ?body.anomaly.anomaly_id(), "Anomaly received");
    let event = ViewerEvent::AnomalyDetected(body.anomaly);
    publish(&state, &event, session_scope(body.session_id)).await
}

/// `POST /internal/session-stats` -- publish `session:stats`.
pub async fn session_stats(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionStatsRequest>, JsonRejection>,
) -> Result<Json<IngestAck>, GatewayError> {
    let Json(body) = body?;
    let event = ViewerEvent::SessionStats(body.stats);
    publish(&state, &event, session_scope(body.session_id)).await
}

/// `POST /internal/node-status` -- publish `node:status` to the node's
/// scope. A blank `nodeId` is rejected.
pub async fn node_status(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NodeStatusRequest>, JsonRejection>,
) -> Result<Json<IngestAck>, GatewayError> {
    let Json(body) = body?;
    let scope = ScopeName::node(body.node_id)
        .map_err(|e| GatewayError::MalformedPayload(format!("nodeId: {e}")))?;
    let event = ViewerEvent::NodeStatus(body.status);
    publish(&state, &event, Some(scope)).await
}

/// `POST /internal/sensor-frame` -- publish `sensor:frame`.
pub async fn sensor_frame(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SensorFrameRequest>, JsonRejection>,
) -> Result<Json<IngestAck>, GatewayError> {
    let Json(body) = body?;
    let scope = node_scope(body.node_id).or_else(|| session_scope(body.session_id));
    let event = ViewerEvent::SensorFrame(body.frame);
    publish(&state, &event, scope).await
}
