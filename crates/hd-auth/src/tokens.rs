//! Token authority
//!
//! Sole issuer and validator of both token types; the only component that
//! touches the signing secret and the refresh-token store. Refresh tokens are
//! 32 bytes of CSPRNG output handed to the client once; only their SHA-256
//! digest is persisted, so a leaked table row cannot be replayed.

use chrono::{DateTime, Duration, Utc};
use hd_core::Id;
use serde::Serialize;
use std::sync::Arc;

use crate::jwt::{AccessClaims, AccessTokenService};
use crate::store::{
    CredentialStore, NewRefreshToken, RefreshTokenStore, SessionInfo, StoreError, UserRecord,
};
use crate::AuthError;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Token pair handed to a client on login or refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Issues, verifies, rotates, and revokes tokens.
pub struct TokenAuthority {
    access: AccessTokenService,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    credentials: Arc<dyn CredentialStore>,
    refresh_ttl: Duration,
    store_timeout: std::time::Duration,
}

impl TokenAuthority {
    pub fn new(
        access: AccessTokenService,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            access,
            refresh_tokens,
            credentials,
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECONDS as i64),
            store_timeout: std::time::Duration::from_secs(5),
        }
    }

    /// Override the refresh token lifetime
    pub fn with_refresh_ttl(mut self, ttl_seconds: u64) -> Self {
        self.refresh_ttl = Duration::seconds(ttl_seconds as i64);
        self
    }

    /// Override the per-call store timeout
    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_seconds(&self) -> u64 {
        self.access.ttl_seconds()
    }

    /// Issue a fresh access/refresh pair for an active user.
    ///
    /// Side effect: one new refresh token row, durable before return.
    pub async fn issue_tokens(
        &self,
        user: &UserRecord,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        if !user.active {
            return Err(AuthError::Unauthenticated);
        }

        let role = self
            .bounded(self.credentials.find_role_by_id(user.role_id))
            .await?;
        let admin = role.map(|r| r.admin).unwrap_or(false);

        let access_token = self
            .access
            .issue(user.id, &user.login, user.role_id, admin)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let refresh_token = generate_refresh_token();
        let now = Utc::now();
        self.bounded(self.refresh_tokens.insert(NewRefreshToken {
            token_hash: refresh_token_hash(&refresh_token),
            user_id: user.id,
            user_agent: user_agent.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            created_at: now,
            expires_at: now + self.refresh_ttl,
        }))
        .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.access.ttl_seconds(),
        })
    }

    /// Verify an access token. Pure signature + expiry check, no I/O.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.access.verify(token).map_err(|_| AuthError::Unauthenticated)
    }

    /// Rotate a refresh token: revoke the presented one, issue a new pair.
    ///
    /// The revocation is an atomic conditional update and completes before
    /// the replacement is issued, so a retry on the old token (or a
    /// concurrent duplicate of it) always fails.
    pub async fn refresh(
        &self,
        presented: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        let hash = refresh_token_hash(presented);

        let row = self
            .bounded(self.refresh_tokens.find_by_hash(&hash))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if row.revoked || row.is_expired(Utc::now()) {
            tracing::debug!(user_id = row.user_id, "refresh with dead token");
            return Err(AuthError::Unauthenticated);
        }

        let user = self
            .bounded(self.credentials.find_user_by_id(row.user_id))
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.active {
            tracing::debug!(user_id = user.id, "refresh for inactive user");
            return Err(AuthError::Unauthenticated);
        }

        // Exactly one of any concurrent refreshes of this token gets here and
        // wins the conditional update; the rest fail as replays.
        let revoked_now = self.bounded(self.refresh_tokens.revoke(&hash)).await?;
        if !revoked_now {
            tracing::warn!(user_id = user.id, "refresh token replay detected");
            return Err(AuthError::Unauthenticated);
        }

        self.issue_tokens(&user, user_agent, ip_address).await
    }

    /// Revoke a refresh token. Idempotent; reports whether a row changed.
    pub async fn revoke(&self, presented: &str) -> Result<bool, AuthError> {
        let hash = refresh_token_hash(presented);
        Ok(self.bounded(self.refresh_tokens.revoke(&hash)).await?)
    }

    /// Revoke every live refresh token of a user ("logout everywhere")
    pub async fn revoke_all(&self, user_id: Id) -> Result<u64, AuthError> {
        Ok(self
            .bounded(self.refresh_tokens.revoke_all_for_user(user_id))
            .await?)
    }

    /// Active sessions of a user, derived from live refresh tokens
    pub async fn list_active_sessions(&self, user_id: Id) -> Result<Vec<SessionInfo>, AuthError> {
        let rows = self
            .bounded(self.refresh_tokens.list_active_for_user(user_id, Utc::now()))
            .await?;
        Ok(rows.iter().map(SessionInfo::from).collect())
    }

    /// Drop expired refresh token rows. Runs from a background interval, never
    /// from the request path.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let count = self
            .bounded(self.refresh_tokens.delete_expired_before(Utc::now()))
            .await?;
        if count > 0 {
            tracing::info!(count, "swept expired refresh tokens");
        }
        Ok(count)
    }

    /// Run a store call under the configured timeout; a hung backend surfaces
    /// as `Unavailable` instead of stalling the request.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::Unavailable("store call timed out".into())),
        }
    }
}

/// Generate an opaque refresh token: 32 bytes of CSPRNG output, base64-encoded
pub fn generate_refresh_token() -> String {
    use base64::{engine::general_purpose, Engine as _};
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    general_purpose::STANDARD.encode(bytes)
}

/// Digest stored in place of the raw refresh token
pub fn refresh_token_hash(token: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
