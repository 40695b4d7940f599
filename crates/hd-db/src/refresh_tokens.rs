//! Postgres refresh token store
//!
//! Implements the `hd-auth` refresh-token contract. Rotation safety hinges on
//! `revoke`: the conditional update targets only non-revoked rows, so two
//! concurrent refreshes presenting the same token produce exactly one winner
//! with no read-then-write window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hd_auth::{NewRefreshToken, RefreshTokenRecord, RefreshTokenStore, StoreError};
use hd_core::Id;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, FromRow)]
struct RefreshTokenRow {
    id: i64,
    token_hash: String,
    user_id: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            token_hash: row.token_hash,
            user_id: row.user_id,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

const TOKEN_COLUMNS: &str =
    "id, token_hash, user_id, user_agent, ip_address, created_at, expires_at, revoked";

/// Refresh token persistence backed by Postgres
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_hash, user_id, user_agent, ip_address, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(&token.user_agent)
        .bind(&token.ip_address)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError> {
        // Compare-and-set on the revoked flag; at most one caller sees a row
        // flip.
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: Id) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS} FROM refresh_tokens
            WHERE user_id = $1 AND revoked = FALSE AND expires_at > $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        // Targets only rows already past expiry; disjoint from the predicate
        // revoke() updates, so the sweeper cannot race an in-flight refresh.
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected())
    }
}
