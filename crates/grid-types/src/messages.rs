//! Client-to-server requests and server control frames.
//!
//! Viewers never register callbacks with the server. Each subscribe or
//! unsubscribe frame is decoded into a [`ClientMessage`], then converted
//! into an explicit [`ScopeRequest`] that the scope registry consumes.

use serde::{Deserialize, Serialize};

use crate::scope::{ScopeName, ScopeNameError};

/// A frame sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Join `session:<sessionId>`.
    #[serde(rename = "subscribe:session")]
    SubscribeSession {
        /// Session to follow.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Join `node:<nodeId>`.
    #[serde(rename = "subscribe:node")]
    SubscribeNode {
        /// Node to follow.
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    /// Leave `session:<sessionId>`.
    #[serde(rename = "unsubscribe:session")]
    UnsubscribeSession {
        /// Session to stop following.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Leave `node:<nodeId>`.
    #[serde(rename = "unsubscribe:node")]
    UnsubscribeNode {
        /// Node to stop following.
        #[serde(rename = "nodeId")]
        node_id: String,
    },
}

impl ClientMessage {
    /// Convert the frame into the membership change it asks for.
    pub fn into_scope_request(self) -> Result<ScopeRequest, ScopeNameError> {
        Ok(match self {
            Self::SubscribeSession { session_id } => {
                ScopeRequest::Join(ScopeName::session(session_id)?)
            }
            Self::SubscribeNode { node_id } => ScopeRequest::Join(ScopeName::node(node_id)?),
            Self::UnsubscribeSession { session_id } => {
                ScopeRequest::Leave(ScopeName::session(session_id)?)
            }
            Self::UnsubscribeNode { node_id } => ScopeRequest::Leave(ScopeName::node(node_id)?),
        })
    }
}

/// A membership change requested by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRequest {
    /// Add the connection to the scope.
    Join(ScopeName),
    /// Remove the connection from the scope.
    Leave(ScopeName),
}

impl ScopeRequest {
    /// The scope this request touches.
    pub const fn scope(&self) -> &ScopeName {
        match self {
            Self::Join(scope) | Self::Leave(scope) => scope,
        }
    }
}

/// Frames the server sends on its own behalf, outside the viewer event set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ControlEvent {
    /// The registry applied a join; later publishes to `scope` reach this
    /// connection.
    #[serde(rename = "scope:joined")]
    ScopeJoined {
        /// The joined scope.
        scope: ScopeName,
    },
    /// The registry applied a leave.
    #[serde(rename = "scope:left")]
    ScopeLeft {
        /// The left scope.
        scope: ScopeName,
    },
    /// A client frame could not be understood.
    #[serde(rename = "error")]
    Error {
        /// What went wrong.
        message: String,
    },
}

impl ControlEvent {
    /// The wire name of this control event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ScopeJoined { .. } => "scope:joined",
            Self::ScopeLeft { .. } => "scope:left",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize this control event into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
