//! Access token service
//!
//! Issues and verifies the signed, self-contained bearer credential. Access
//! tokens are never persisted; validity is proven by signature and expiry
//! alone, with zero clock leeway so the expiry boundary is exact.

use hd_core::Id;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 900;

/// Claims embedded in an access token.
///
/// Role and admin flags travel inside the token so downstream permission
/// checks need no extra lookup; the request gate still re-loads the live user
/// to catch deactivation within the token window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// Login name
    pub login: String,
    /// Role id at issuance time
    pub role_id: Id,
    /// Admin flag at issuance time
    pub admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

impl AccessClaims {
    /// Parse the subject back into a user id
    pub fn user_id(&self) -> Option<Id> {
        self.sub.parse().ok()
    }
}

/// Access token errors.
///
/// Verification failures all collapse into `Invalid`: the caller cannot tell
/// a malformed token from a bad signature from an expired one.
#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("invalid access token")]
    Invalid,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Service for creating and validating access tokens
#[derive(Clone)]
pub struct AccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: u64,
}

impl AccessTokenService {
    /// Create a new service with the given signing secret and the default TTL
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttl(secret, DEFAULT_ACCESS_TTL_SECONDS)
    }

    /// Create a new service with an explicit TTL in seconds
    pub fn with_ttl(secret: &[u8], ttl_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    /// Access token lifetime in seconds
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Issue a signed access token for the given user
    pub fn issue(
        &self,
        user_id: Id,
        login: &str,
        role_id: Id,
        admin: bool,
    ) -> Result<String, AccessTokenError> {
        let now = chrono::Utc::now().timestamp() as usize;

        let claims = AccessClaims {
            sub: user_id.to_string(),
            login: login.to_string(),
            role_id,
            admin,
            iat: now,
            exp: now + self.ttl_seconds as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AccessTokenError::Encoding(e.to_string()))
    }

    /// Verify a token: signature check plus expiry check, no I/O.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AccessTokenError> {
        let mut validation = Validation::default();
        // Exact expiry boundary; the default 60s leeway would let an expired
        // token pass for a minute.
        validation.leeway = 0;

        match decode::<AccessClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                tracing::debug!(cause = %e, "access token rejected");
                Err(AccessTokenError::Invalid)
            }
        }
    }
}

/// Extract the bearer token from an `Authorization` header value.
///
/// Only the literal `Bearer ` scheme prefix is accepted.
pub fn extract_bearer_token(authorization: &str) -> Option<&str> {
    authorization
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccessTokenService {
        AccessTokenService::new(b"test-secret-key-at-least-32-bytes")
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let token = service().issue(7, "agent", 3, false).unwrap();
        let claims = service().verify(&token).unwrap();

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.login, "agent");
        assert_eq!(claims.role_id, 3);
        assert!(!claims.admin);
    }

    #[test]
    fn test_default_ttl_is_fifteen_minutes() {
        let token = service().issue(1, "admin", 1, true).unwrap();
        let claims = service().verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().issue(1, "admin", 1, true).unwrap();
        let other = AccessTokenService::new(b"completely-different-secret-key!!");
        assert!(matches!(other.verify(&token), Err(AccessTokenError::Invalid)));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Craft a token whose lifetime already elapsed.
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = AccessClaims {
            sub: "1".into(),
            login: "admin".into(),
            role_id: 1,
            admin: true,
            iat: now - 901,
            exp: now - 1,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-at-least-32-bytes"),
        )
        .unwrap();

        assert!(matches!(service().verify(&token), Err(AccessTokenError::Invalid)));
    }

    #[test]
    fn test_unexpired_token_accepted() {
        // A token still well inside its window verifies.
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = AccessClaims {
            sub: "1".into(),
            login: "admin".into(),
            role_id: 1,
            admin: true,
            iat: now - 870,
            exp: now + 30,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-at-least-32-bytes"),
        )
        .unwrap();

        assert!(service().verify(&token).is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            service().verify("not.a.token"),
            Err(AccessTokenError::Invalid)
        ));
        assert!(matches!(service().verify(""), Err(AccessTokenError::Invalid)));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        // Scheme prefix is matched literally.
        assert_eq!(extract_bearer_token("bearer abc123"), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("abc123"), None);
    }
}
