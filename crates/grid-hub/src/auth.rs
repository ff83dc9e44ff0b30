//! Connection Authenticator.
//!
//! Verifies the bearer credential a viewer presents at handshake time. The
//! credential is an HS256 JWT signed with the secret shared with the login
//! service; this crate only verifies tokens, it never issues them.

use grid_types::{Identity, Role};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AuthError;

/// Secret used outside production when none is configured.
pub const DEV_JWT_SECRET: &str = "dev_secret_do_not_use_in_prod";

/// Claims the login service puts in a viewer token.
///
/// `exp` is validated by `jsonwebtoken` itself and is not needed here.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId", alias = "sub")]
    user_id: String,
    role: Role,
    #[serde(default)]
    email: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            role: claims.role,
            email: claims.email,
        }
    }
}

/// Verifies viewer credentials against the shared secret.
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    /// Create an authenticator for HS256 tokens.
    ///
    /// `leeway_secs` is the clock skew tolerated when checking `exp`.
    pub fn new(secret: &[u8], leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify a credential and decode the identity it carries.
    ///
    /// Missing, expired, badly signed and malformed tokens are all
    /// rejected; nothing is retried.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })
    }

    /// Check that `identity` holds one of the `allowed` roles.
    pub fn require_role(identity: &Identity, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&identity.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

impl core::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authenticator")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

/// Pick the credential out of a handshake.
///
/// An `Authorization: Bearer <token>` header wins over the `token` query
/// parameter. Blank values count as absent.
pub fn credential_from<'a>(
    authorization: Option<&'a str>,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    let from_header = authorization.and_then(|value| {
        let (scheme, token) = value.trim().split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
    });

    from_header
        .filter(|token| !token.is_empty())
        .or_else(|| query_token.map(str::trim).filter(|token| !token.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde::Serialize;

    pub(crate) const SECRET: &[u8] = b"unit-test-secret";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        #[serde(rename = "userId")]
        user_id: &'a str,
        role: &'a str,
        email: &'a str,
        exp: i64,
    }

    pub(crate) fn mint(secret: &[u8], role: &str, exp_offset_secs: i64) -> String {
        let claims = TestClaims {
            user_id: "user-1",
            role,
            email: "operator@venue.test",
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
            .unwrap()
    }

    #[test]
    fn valid_token_yields_identity() {
        let auth = Authenticator::new(SECRET, 0);
        let token = mint(SECRET, "OPERATOR", 3600);
        let identity = auth.verify(Some(&token)).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.role, Role::Operator);
        assert_eq!(identity.email, "operator@venue.test");
    }

    #[test]
    fn missing_token_is_rejected() {
        let auth = Authenticator::new(SECRET, 0);
        assert_eq!(auth.verify(None), Err(AuthError::MissingToken));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = Authenticator::new(SECRET, 0);
        let token = mint(SECRET, "OPERATOR", -3600);
        assert_eq!(auth.verify(Some(&token)), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let auth = Authenticator::new(SECRET, 0);
        let token = mint(b"someone-else", "ADMIN", 3600);
        assert!(matches!(auth.verify(Some(&token)), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn garbage_and_unknown_role_are_rejected() {
        let auth = Authenticator::new(SECRET, 0);
        assert!(matches!(
            auth.verify(Some("not.a.jwt")),
            Err(AuthError::Invalid(_))
        ));
        let token = mint(SECRET, "JANITOR", 3600);
        assert!(matches!(auth.verify(Some(&token)), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn role_gate() {
        let auth = Authenticator::new(SECRET, 0);
        let operator = auth.verify(Some(&mint(SECRET, "OPERATOR", 60))).unwrap();
        assert_eq!(
            Authenticator::require_role(&operator, &[Role::Admin]),
            Err(AuthError::Forbidden)
        );
        assert!(Authenticator::require_role(&operator, &[Role::Admin, Role::Operator]).is_ok());
    }

    #[test]
    fn header_wins_over_query() {
        assert_eq!(credential_from(Some("Bearer abc"), Some("xyz")), Some("abc"));
        assert_eq!(credential_from(Some("bearer  abc "), None), Some("abc"));
    }

    #[test]
    fn query_used_when_header_absent_or_unusable() {
        assert_eq!(credential_from(None, Some("xyz")), Some("xyz"));
        assert_eq!(credential_from(Some("Basic dXNlcg=="), Some("xyz")), Some("xyz"));
        assert_eq!(credential_from(Some("Bearer "), Some(" ")), None);
        assert_eq!(credential_from(None, None), None);
    }
}
