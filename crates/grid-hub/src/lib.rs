//! Real-time distribution core for the Motion Grid dashboard.
//!
//! Producers push tracking frames and anomalies in; authenticated viewers
//! join interest scopes and receive the events published to them. This
//! crate is transport-agnostic: the HTTP and WebSocket surface lives in
//! `grid-gateway` and talks to the core only through [`HubHandle`].
//!
//! # Modules
//!
//! - [`auth`] -- Connection Authenticator (JWT verification, credential lookup)
//! - [`lifecycle`] -- Handshake, admission, connection phases and table
//! - [`registry`] -- Scope Registry (`session:<id>` / `node:<id>` membership)
//! - [`envelope`] -- Serialise-once routing envelope
//! - [`router`] -- Event Router (non-blocking fan-out with drop accounting)
//! - [`hub`] -- The single task that owns registry and connections
//! - [`config`] -- Hub tuning knobs
//! - [`error`] -- Error types

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod registry;
pub mod router;

pub use auth::{Authenticator, DEV_JWT_SECRET, credential_from};
pub use config::HubConfig;
pub use envelope::Envelope;
pub use error::{AuthError, HubError};
pub use hub::{Hub, HubHandle, HubStats, ScopeStats};
pub use lifecycle::{
    Admission, CloseReason, Connection, ConnectionPhase, ConnectionTable, Delivery, Handshake,
    Outbound, Outbox, Registration,
};
pub use registry::ScopeRegistry;
pub use router::{DispatchReport, EventRouter};
