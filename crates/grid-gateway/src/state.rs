//! Shared application state for the gateway.
//!
//! [`AppState`] is wrapped in [`Arc`] and injected via Axum's `State`
//! extractor. It holds no mutable data of its own: connection and scope
//! state lives in the hub task and is reached through [`HubHandle`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use grid_hub::{Authenticator, HubHandle};

/// Shared state for the Axum application.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Client of the realtime hub task.
    pub hub: HubHandle,
    /// Verifies viewer and operator credentials.
    pub authenticator: Arc<Authenticator>,
    /// Interval between transport pings, `None` to disable.
    pub heartbeat: Option<Duration>,
    /// Allowed CORS origin; `*` allows any.
    pub cors_origin: String,
    /// Wall-clock start time, reported by `/health`.
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl AppState {
    /// Create the state for a freshly spawned hub.
    pub fn new(hub: HubHandle, authenticator: Authenticator, heartbeat: Option<Duration>) -> Self {
        Self {
            hub,
            authenticator: Arc::new(authenticator),
            heartbeat,
            cors_origin: String::from("*"),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Restrict CORS to `origin`.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }

    /// Whole seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
