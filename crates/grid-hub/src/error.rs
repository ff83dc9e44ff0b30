//! Error types for the real-time core.

/// Errors returned by [`HubHandle`](crate::hub::HubHandle) calls.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has shut down (or was never started), so the command
    /// could not be delivered or answered.
    #[error("realtime hub is not running")]
    Unavailable,

    /// An event payload could not be serialized into a frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a connection handshake is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Neither an `Authorization` header nor a `token` query parameter was
    /// presented.
    #[error("authentication required")]
    MissingToken,

    /// The credential's `exp` claim is in the past.
    #[error("token expired")]
    Expired,

    /// Bad signature, wrong algorithm, malformed token or claims.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The identity is valid but its role may not use the resource.
    #[error("insufficient permissions")]
    Forbidden,
}
