//! Error types for the gateway.
//!
//! [`GatewayError`] unifies every failure an HTTP handler can return and
//! converts into a JSON response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use grid_hub::{AuthError, HubError};

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing, invalid or expired credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential, wrong role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request body could not be decoded into the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The realtime hub is not running.
    #[error("realtime hub unavailable")]
    HubUnavailable,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden => Self::Forbidden(err.to_string()),
            AuthError::MissingToken | AuthError::Expired | AuthError::Invalid(_) => {
                Self::Unauthorized(err.to_string())
            }
        }
    }
}

impl From<HubError> for GatewayError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Unavailable => Self::HubUnavailable,
            HubError::Serialization(e) => Self::Internal(format!("JSON error: {e}")),
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedPayload(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::MalformedPayload(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::HubUnavailable => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
