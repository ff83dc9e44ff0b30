//! Authenticated viewer identity.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Dashboard user role carried in the viewer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    /// Watches live sessions and triages anomalies.
    Operator,
    /// Reviews recorded sessions and analytics.
    Analyst,
    /// Full access, including operator-only endpoints.
    Admin,
}

impl Role {
    /// The wire name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "OPERATOR",
            Self::Analyst => "ANALYST",
            Self::Admin => "ADMIN",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decoded identity attached to a connection once its credential has
/// been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Identity {
    /// Subject id of the user the credential was issued to.
    pub user_id: String,
    /// The user's role.
    pub role: Role,
    /// The user's email, used for log context.
    pub email: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn role_uses_screaming_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"ANALYST\"").unwrap();
        assert_eq!(role, Role::Analyst);
        assert_eq!(role.to_string(), "ANALYST");
    }

    #[test]
    fn identity_round_trips_camel_case() {
        let json = r#"{"userId":"u-1","role":"OPERATOR","email":"op@venue.test"}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.role, Role::Operator);
    }
}
