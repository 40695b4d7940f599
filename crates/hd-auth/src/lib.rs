//! # hd-auth
//!
//! Authentication and authorization core for Helpdesk RS.
//!
//! ## Features
//!
//! - Signed, short-lived access tokens (JWT)
//! - Opaque, rotating refresh tokens with revocation
//! - Password hashing behind a swappable capability
//! - Role-based permission evaluation with an admin fast path
//! - Per-request gate: bearer extraction, live user re-check, login throttling

pub mod gate;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod store;
pub mod tokens;

use thiserror::Error;

pub use gate::{LoginRateLimiter, RequestGate, RequestHeaders};
pub use jwt::{AccessClaims, AccessTokenService};
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use permissions::{last_admin_survives, CurrentUser, Grant};
pub use store::{
    CredentialStore, MemoryCredentialStore, MemoryRefreshTokenStore, NewRefreshToken,
    RefreshTokenRecord, RefreshTokenStore, RoleRecord, SessionInfo, StoreError, UserRecord,
};
pub use tokens::{IssuedTokens, TokenAuthority};

/// Errors surfaced by the authentication core.
///
/// `Unauthenticated` deliberately carries no cause: malformed tokens, bad
/// signatures, expired tokens, revoked refresh tokens, and deactivated users
/// are indistinguishable to the caller. The cause is logged at debug level
/// where it occurs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("auth backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}
