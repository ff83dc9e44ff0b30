//! Gateway startup helper.
//!
//! [`spawn_gateway`] binds the listener eagerly, so an unusable address is
//! reported to the caller, then serves on a background Tokio task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grid_gateway::startup::spawn_gateway;
//!
//! let gateway = spawn_gateway(&config, state, shutdown_signal()).await?;
//! tracing::info!(addr = %gateway.local_addr, "ready");
//! gateway.task.await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the gateway.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A gateway serving on a background task.
#[derive(Debug)]
pub struct RunningGateway {
    /// Address actually bound (useful when the configured port is `0`).
    pub local_addr: SocketAddr,
    /// The serving task. Completes after graceful shutdown.
    pub task: JoinHandle<()>,
}

/// Bind the gateway and serve it on a background task until `shutdown`
/// resolves.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or cannot
/// be bound.
pub async fn spawn_gateway<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<RunningGateway, StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("local address: {e}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Gateway exited with error");
        }
    });

    tracing::info!(%local_addr, "Gateway spawned on background task");

    Ok(RunningGateway { local_addr, task })
}
