//! Interest scope names.
//!
//! A scope partitions event delivery to the viewers that asked for it. On
//! the wire a scope is a plain string, `session:<sessionId>` or
//! `node:<nodeId>`; in Rust it is a closed enum so that a malformed name
//! can never reach the registry.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix of session scope names.
pub const SESSION_PREFIX: &str = "session";

/// Prefix of node scope names.
pub const NODE_PREFIX: &str = "node";

/// Errors produced when building or parsing a [`ScopeName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeNameError {
    /// The id part of the scope name was empty.
    #[error("scope id must not be empty")]
    EmptyId,

    /// The prefix before `:` was neither `session` nor `node`.
    #[error("unknown scope kind: {0}")]
    UnknownKind(String),

    /// The string had no `<kind>:<id>` shape at all.
    #[error("malformed scope name: {0}")]
    Malformed(String),
}

/// A named interest group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScopeName {
    /// All viewers following one recording/live session.
    Session(String),
    /// All viewers following one edge sensor node.
    Node(String),
}

impl ScopeName {
    /// Build a `session:<id>` scope.
    pub fn session(id: impl Into<String>) -> Result<Self, ScopeNameError> {
        non_empty(id.into()).map(Self::Session)
    }

    /// Build a `node:<id>` scope.
    pub fn node(id: impl Into<String>) -> Result<Self, ScopeNameError> {
        non_empty(id.into()).map(Self::Node)
    }

    /// The scope kind prefix (`session` or `node`).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Session(_) => SESSION_PREFIX,
            Self::Node(_) => NODE_PREFIX,
        }
    }

    /// The id part after the prefix.
    pub fn id(&self) -> &str {
        match self {
            Self::Session(id) | Self::Node(id) => id,
        }
    }
}

fn non_empty(id: String) -> Result<String, ScopeNameError> {
    if id.trim().is_empty() {
        Err(ScopeNameError::EmptyId)
    } else {
        Ok(id)
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl FromStr for ScopeName {
    type Err = ScopeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ScopeNameError::Malformed(s.to_owned()))?;
        match kind {
            SESSION_PREFIX => Self::session(id),
            NODE_PREFIX => Self::node(id),
            other => Err(ScopeNameError::UnknownKind(other.to_owned())),
        }
    }
}

impl TryFrom<String> for ScopeName {
    type Error = ScopeNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScopeName> for String {
    fn from(scope: ScopeName) -> Self {
        scope.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_kind_prefix() {
        assert_eq!(ScopeName::session("S1").unwrap().to_string(), "session:S1");
        assert_eq!(ScopeName::node("N1").unwrap().to_string(), "node:N1");
    }

    #[test]
    fn parse_keeps_colons_in_id() {
        let scope: ScopeName = "node:edge:07".parse().unwrap();
        assert_eq!(scope, ScopeName::Node("edge:07".to_owned()));
    }

    #[test]
    fn rejects_empty_id() {
        assert_eq!(ScopeName::session(""), Err(ScopeNameError::EmptyId));
        assert_eq!("node:".parse::<ScopeName>(), Err(ScopeNameError::EmptyId));
    }

    #[test]
    fn rejects_unknown_kind_and_missing_separator() {
        assert!(matches!(
            "room:1".parse::<ScopeName>(),
            Err(ScopeNameError::UnknownKind(_))
        ));
        assert!(matches!(
            "session".parse::<ScopeName>(),
            Err(ScopeNameError::Malformed(_))
        ));
    }

    #[test]
    fn serializes_as_plain_string() {
        let scope = ScopeName::session("S1").unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, "\"session:S1\"");
        let back: ScopeName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope);
    }
}
