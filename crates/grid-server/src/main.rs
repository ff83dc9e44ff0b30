//! Motion Grid real-time server.
//!
//! Wires the distribution core to its HTTP surface and runs until
//! `Ctrl-C` or `SIGTERM`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `grid-config.yaml` (or `GRID_CONFIG`) and
//!    the environment
//! 2. Initialize structured logging (tracing)
//! 3. Resolve the JWT secret (fatal in production when missing)
//! 4. Spawn the realtime hub task
//! 5. Bind and spawn the gateway
//!
//! # Shutdown Sequence
//!
//! On signal the hub closes every viewer connection and clears its
//! registry, then the gateway drains in-flight HTTP requests.

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use grid_gateway::server::ServerConfig;
use grid_gateway::state::AppState;
use grid_gateway::spawn_gateway;
use grid_hub::{Authenticator, Hub, HubHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_CONFIG_PATH, GridConfig, JwtSecret, LogFormat, LoggingSection};
use crate::error::AppError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is unusable, the listener cannot be
/// bound, or a background task fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config_path = std::env::var("GRID_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = GridConfig::load(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        path = %config_path.display(),
        found = config_path.exists(),
        host = %config.server.host,
        port = config.server.port,
        environment = ?config.server.environment,
        "Configuration loaded"
    );

    // 3. Resolve the credential secret.
    let secret = config.auth.resolve_secret(config.server.environment)?;
    if secret == JwtSecret::Development {
        warn!("JWT_SECRET not set; using the development secret");
    }
    let authenticator = Authenticator::new(secret.as_bytes(), config.auth.leeway_secs);

    // 4. Spawn the hub.
    let (hub, hub_task) = Hub::spawn(&config.realtime);
    info!(
        outbound_capacity = config.realtime.outbound_capacity,
        max_dropped_messages = config.realtime.max_dropped_messages,
        heartbeat_interval_secs = config.realtime.heartbeat_interval_secs,
        "Realtime hub spawned"
    );

    // 5. Spawn the gateway.
    let state = Arc::new(
        AppState::new(
            hub.clone(),
            authenticator,
            config.realtime.heartbeat_interval(),
        )
        .with_cors_origin(config.server.cors_origin.clone()),
    );
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let gateway = spawn_gateway(&server_config, state, shutdown(hub)).await?;
    info!(addr = %gateway.local_addr, "Motion Grid ready");

    gateway.task.await.map_err(|e| AppError::Task {
        message: format!("gateway task: {e}"),
    })?;
    hub_task.await.map_err(|e| AppError::Task {
        message: format!("hub task: {e}"),
    })?;

    info!("Motion Grid shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingSection) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolves once a termination signal arrives and the hub has closed
/// every viewer connection.
async fn shutdown(hub: HubHandle) {
    wait_for_signal().await;
    info!("Shutdown signal received");
    if let Err(e) = hub.shutdown().await {
        warn!(error = %e, "Hub already stopped");
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
