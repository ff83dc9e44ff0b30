//! Shared fixtures for the gateway integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use grid_gateway::router::build_router;
use grid_gateway::state::AppState;
use grid_hub::{Authenticator, Hub, HubConfig};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const SECRET: &[u8] = b"gateway-test-secret";

/// Spawn a hub with default tuning and wrap it in gateway state.
pub fn make_state() -> Arc<AppState> {
    make_state_with(&HubConfig::default())
}

pub fn make_state_with(config: &HubConfig) -> Arc<AppState> {
    let (hub, _task) = Hub::spawn(config);
    Arc::new(AppState::new(
        hub,
        Authenticator::new(SECRET, 0),
        config.heartbeat_interval(),
    ))
}

/// Sign a viewer token with `role` valid for `exp_offset_secs`.
pub fn mint(role: &str, exp_offset_secs: i64) -> String {
    mint_with(SECRET, role, exp_offset_secs)
}

pub fn mint_with(secret: &[u8], role: &str, exp_offset_secs: i64) -> String {
    let claims = json!({
        "userId": "viewer-1",
        "role": role,
        "email": "viewer@venue.test",
        "exp": chrono::Utc::now().timestamp() + exp_offset_secs,
    });
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST a JSON body through the router and return status and body.
pub async fn post_json(state: &Arc<AppState>, path: &str, body: &Value) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}
