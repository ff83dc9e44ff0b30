//! Shared wire types for the Motion Grid real-time core.
//!
//! This crate is the single source of truth for everything that crosses
//! the viewer WebSocket or the producer ingest boundary. Simple types are
//! exported to `TypeScript` via `ts-rs` for the operator dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for connection handles
//! - [`scope`] -- `session:<id>` / `node:<id>` interest scope names
//! - [`identity`] -- Authenticated viewer identity and roles
//! - [`events`] -- The closed set of viewer events and their payloads
//! - [`messages`] -- Client subscribe frames, scope requests, control frames

pub mod events;
pub mod identity;
pub mod ids;
pub mod messages;
pub mod scope;

// Re-export all public types at crate root for convenience.
pub use events::{AnomalyRecord, EntityTracking, ViewerEvent};
pub use identity::{Identity, Role};
pub use ids::ConnectionId;
pub use messages::{ClientMessage, ControlEvent, ScopeRequest};
pub use scope::{ScopeName, ScopeNameError};
