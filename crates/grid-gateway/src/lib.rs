//! HTTP and `WebSocket` surface of the Motion Grid real-time core.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Viewer `WebSocket`** (`/ws`) -- authenticated at handshake, then
//!   scope subscriptions in and viewer events out
//! - **Ingest endpoints** (`/internal/*`) -- the producer pushes tracking
//!   batches, anomalies, session stats, node status and sensor frames
//! - **Health and stats** (`/health`, `/api/realtime/stats`)
//!
//! # Architecture
//!
//! Handlers hold no connection state. Everything goes through the
//! [`HubHandle`](grid_hub::HubHandle) in [`AppState`]: the socket task
//! registers with the hub and forwards its outbound queue, ingest handlers
//! publish, the stats handler queries.

pub mod error;
pub mod handlers;
pub mod ingest;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::GatewayError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{RunningGateway, StartupError, spawn_gateway};
pub use state::AppState;
