//! Integration tests for the gateway's HTTP endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Viewer connections are registered with the hub
//! through the same handshake the socket endpoint uses, so deliveries can
//! be observed on their outbound queues.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{SECRET, body_to_json, make_state, mint, post_json};
use grid_gateway::router::build_router;
use grid_gateway::state::AppState;
use grid_hub::{Authenticator, Handshake, Registration};
use grid_types::ScopeName;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn connect_viewer(state: &Arc<AppState>) -> Registration {
    let auth = Authenticator::new(SECRET, 0);
    let token = mint("OPERATOR", 600);
    let admission = Handshake::begin().authenticate(&auth, Some(&token)).unwrap();
    state.hub.connect(admission).await.unwrap()
}

fn decode(frame: &str) -> Value {
    serde_json::from_str(frame).unwrap()
}

async fn get(state: &Arc<AppState>, path: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::get(path);
    if let Some(token) = bearer {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response = build_router(Arc::clone(state))
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// =========================================================================
// Health and stats
// =========================================================================

#[tokio::test]
async fn test_health_reports_ok() {
    let state = make_state();
    let _viewer = connect_viewer(&state).await;

    let (status, json) = get(&state, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 1);
    assert!(json["uptimeSecs"].is_u64());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_degraded_after_hub_shutdown() {
    let state = make_state();
    state.hub.shutdown().await.unwrap();

    let (status, json) = get(&state, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_stats_requires_token() {
    let state = make_state();
    let (status, json) = get(&state, "/api/realtime/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["status"], 401);
}

#[tokio::test]
async fn test_stats_requires_admin() {
    let state = make_state();
    let token = mint("OPERATOR", 600);
    let (status, _) = get(&state, "/api/realtime/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stats_for_admin() {
    let state = make_state();
    let viewer = connect_viewer(&state).await;
    state
        .hub
        .join(viewer.id, ScopeName::session("S1").unwrap())
        .await
        .unwrap();

    let token = mint("ADMIN", 600);
    let (status, json) = get(&state, "/api/realtime/stats", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"connections": 1, "scopes": [{"scope": "session:S1", "members": 1}]})
    );
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let state = make_state();
    let token = mint("ADMIN", -600);
    let (status, _) = get(&state, "/api/realtime/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =========================================================================
// Viewer socket handshake
// =========================================================================

#[tokio::test]
async fn test_socket_without_token_is_rejected_before_upgrade() {
    let state = make_state();
    let (status, json) = get(&state, "/ws", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "authentication required");
    assert_eq!(state.hub.stats().await.unwrap().connections, 0);
}

#[tokio::test]
async fn test_socket_with_bad_query_token_is_rejected() {
    let state = make_state();
    let (status, _) = get(&state, "/ws?token=garbage", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(state.hub.stats().await.unwrap().connections, 0);
}

// =========================================================================
// Ingest
// =========================================================================

#[tokio::test]
async fn test_entity_update_reaches_session_members_with_latency() {
    let state = make_state();
    let mut member = connect_viewer(&state).await;
    let mut outsider = connect_viewer(&state).await;
    state
        .hub
        .join(member.id, ScopeName::session("S1").unwrap())
        .await
        .unwrap();
    member.outbound.recv().await.unwrap(); // scope:joined

    let sent_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
        - 0.5;
    let (status, json) = post_json(
        &state,
        "/internal/entity-update",
        &json!({
            "sessionId": "S1",
            "entities": [{"id": "e1", "position": {"x": 1.0, "y": 2.0, "z": 0.0}, "team": "home"}],
            "stats": {"fps": 30},
            "sentAt": sent_at,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "ok"}));

    let frame = decode(&member.outbound.recv().await.unwrap());
    assert_eq!(frame["event"], "entity:tracking");
    assert_eq!(frame["data"]["entities"][0]["team"], "home");
    assert_eq!(frame["data"]["stats"]["fps"], 30);
    let latency = frame["data"]["latencyMs"].as_u64().unwrap();
    assert!((400..10_000).contains(&latency), "latency {latency}");

    assert!(outsider.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_entity_update_without_sent_at_has_zero_latency() {
    let state = make_state();
    let mut viewer = connect_viewer(&state).await;

    let (status, _) = post_json(
        &state,
        "/internal/entity-update",
        &json!({"sessionId": "", "entities": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Blank session id broadcasts.
    let frame = decode(&viewer.outbound.recv().await.unwrap());
    assert_eq!(frame["data"]["latencyMs"], 0);
}

#[tokio::test]
async fn test_ingest_payloads_reach_viewers_unchanged() {
    let state = make_state();
    let mut viewer = connect_viewer(&state).await;

    let entities = json!([
        {"id": 7, "position": {"x": 1, "y": 2}},
        {"id": "e1", "position": null, "velocity": [0.1, 0.2]}
    ]);
    let (status, _) = post_json(
        &state,
        "/internal/entity-update",
        &json!({"entities": entities, "stats": null}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&viewer.outbound.recv().await.unwrap());
    assert_eq!(frame["data"]["entities"], entities);
    assert_eq!(frame["data"].get("stats"), Some(&Value::Null));

    let anomaly = json!({"anomalyId": 42, "severity": "WARNING", "occurredAt": 1_700_000_000});
    let (status, _) = post_json(&state, "/internal/anomaly", &json!({"anomaly": anomaly})).await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&viewer.outbound.recv().await.unwrap());
    assert_eq!(frame["data"], anomaly);
}

#[tokio::test]
async fn test_malformed_ingest_is_rejected_then_recovers() {
    let state = make_state();
    let mut viewer = connect_viewer(&state).await;

    let (status, json) = post_json(&state, "/internal/entity-update", &json!({"sentAt": 1.0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);

    let (status, _) = post_json(&state, "/internal/anomaly", &json!({"sessionId": "S1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(viewer.outbound.try_recv().is_err());

    let (status, _) = post_json(
        &state,
        "/internal/anomaly",
        &json!({"anomaly": {"anomalyId": "ANOM_1", "headline": "Crowd surge", "severity": "HIGH", "zone": "north"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&viewer.outbound.recv().await.unwrap());
    assert_eq!(frame["event"], "anomaly:detected");
    assert_eq!(frame["data"]["zone"], "north");
}

#[tokio::test]
async fn test_node_status_targets_node_scope() {
    let state = make_state();
    let mut watcher = connect_viewer(&state).await;
    let mut other = connect_viewer(&state).await;
    state
        .hub
        .join(watcher.id, ScopeName::node("N1").unwrap())
        .await
        .unwrap();
    watcher.outbound.recv().await.unwrap(); // scope:joined

    let (status, _) = post_json(
        &state,
        "/internal/node-status",
        &json!({"nodeId": "N1", "status": {"online": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&watcher.outbound.recv().await.unwrap());
    assert_eq!(frame, json!({"event": "node:status", "data": {"online": true}}));
    assert!(other.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_node_status_requires_node_id() {
    let state = make_state();
    let (status, _) = post_json(
        &state,
        "/internal/node-status",
        &json!({"nodeId": "", "status": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sensor_frame_prefers_node_scope() {
    let state = make_state();
    let mut node_watcher = connect_viewer(&state).await;
    let mut session_watcher = connect_viewer(&state).await;
    state
        .hub
        .join(node_watcher.id, ScopeName::node("N1").unwrap())
        .await
        .unwrap();
    state
        .hub
        .join(session_watcher.id, ScopeName::session("S1").unwrap())
        .await
        .unwrap();
    node_watcher.outbound.recv().await.unwrap();
    session_watcher.outbound.recv().await.unwrap();

    let (status, _) = post_json(
        &state,
        "/internal/sensor-frame",
        &json!({"sessionId": "S1", "nodeId": "N1", "frame": {"seq": 7}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&node_watcher.outbound.recv().await.unwrap());
    assert_eq!(frame["event"], "sensor:frame");
    assert!(session_watcher.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_session_stats_broadcast_without_session() {
    let state = make_state();
    let mut viewer = connect_viewer(&state).await;

    let (status, _) = post_json(
        &state,
        "/internal/session-stats",
        &json!({"stats": {"entities": 22}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = decode(&viewer.outbound.recv().await.unwrap());
    assert_eq!(frame, json!({"event": "session:stats", "data": {"entities": 22}}));
}

#[tokio::test]
async fn test_ingest_with_hub_down_is_503() {
    let state = make_state();
    state.hub.shutdown().await.unwrap();

    let (status, json) = post_json(
        &state,
        "/internal/anomaly",
        &json!({"anomaly": {"anomalyId": "ANOM_1"}}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], 503);
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let state = make_state();
    let response = build_router(state)
        .oneshot(Request::get("/api/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
