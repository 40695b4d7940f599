//! Storage contracts for the authentication core
//!
//! The token authority and the request gate only ever talk to these traits.
//! Postgres implementations live in `hd-db`; the in-memory implementations
//! here back tests and development setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hd_core::Id;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Store errors are treated as fatal for the request (5xx class), never as an
/// authentication verdict.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    Backend(String),
}

/// User record as the auth core sees it
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Id,
    pub login: String,
    pub mail: String,
    pub hashed_password: Option<String>,
    pub role_id: Id,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Role record as the auth core sees it
#[derive(Debug, Clone)]
pub struct RoleRecord {
    pub id: Id,
    pub name: String,
    pub admin: bool,
    pub system: bool,
    pub permissions: HashSet<String>,
}

/// Persisted refresh token row
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Id,
    pub token_hash: String,
    pub user_id: Id,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Insert payload for a refresh token row
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: Id,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Active session view derived from a refresh token row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&RefreshTokenRecord> for SessionInfo {
    fn from(row: &RefreshTokenRecord) -> Self {
        Self {
            user_agent: row.user_agent.clone(),
            ip_address: row.ip_address.clone(),
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// User and role lookups needed by the auth core
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user by primary key
    async fn find_user_by_id(&self, id: Id) -> Result<Option<UserRecord>, StoreError>;

    /// Find a user by login, case-insensitively
    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Find a role by primary key
    async fn find_role_by_id(&self, id: Id) -> Result<Option<RoleRecord>, StoreError>;

    /// Record a successful login
    async fn update_last_login(&self, id: Id, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Refresh token persistence
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), StoreError>;

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Mark the matching non-revoked row revoked.
    ///
    /// Must be atomic with respect to concurrent calls on the same hash: of
    /// any number of racing callers, exactly one observes `true`.
    async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError>;

    /// Revoke every non-revoked token of a user; returns the count affected
    async fn revoke_all_for_user(&self, user_id: Id) -> Result<u64, StoreError>;

    /// Non-revoked, non-expired tokens of a user
    async fn list_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    /// Delete rows past their expiry; returns the count deleted
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

// ============================================================================
// In-memory implementations (tests, development)
// ============================================================================

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Id, UserRecord>>,
    roles: RwLock<HashMap<Id, RoleRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().unwrap().insert(user.id, user);
    }

    pub fn insert_role(&self, role: RoleRecord) {
        self.roles.write().unwrap().insert(role.id, role);
    }

    pub fn set_active(&self, id: Id, active: bool) {
        if let Some(user) = self.users.write().unwrap().get_mut(&id) {
            user.active = active;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_id(&self, id: Id) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError> {
        let needle = login.to_lowercase();
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.login.to_lowercase() == needle)
            .cloned())
    }

    async fn find_role_by_id(&self, id: Id) -> Result<Option<RoleRecord>, StoreError> {
        Ok(self.roles.read().unwrap().get(&id).cloned())
    }

    async fn update_last_login(&self, id: Id, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.users.write().unwrap().get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

/// In-memory refresh token store
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    rows: RwLock<HashMap<String, RefreshTokenRecord>>,
    next_id: AtomicI64,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = RefreshTokenRecord {
            id,
            token_hash: token.token_hash.clone(),
            user_id: token.user_id,
            user_agent: token.user_agent,
            ip_address: token.ip_address,
            created_at: token.created_at,
            expires_at: token.expires_at,
            revoked: false,
        };
        self.rows.write().unwrap().insert(token.token_hash, record);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.rows.read().unwrap().get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError> {
        // Compare-and-set under the write lock: revoke only if not yet revoked.
        let mut rows = self.rows.write().unwrap();
        match rows.get_mut(token_hash) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Id) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().unwrap();
        let mut count = 0;
        for row in rows.values_mut() {
            if row.user_id == user_id && !row.revoked {
                row.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let mut active: Vec<RefreshTokenRecord> = self
            .rows
            .read()
            .unwrap()
            .values()
            .filter(|row| row.user_id == user_id && !row.revoked && !row.is_expired(now))
            .cloned()
            .collect();
        active.sort_by_key(|row| row.created_at);
        Ok(active)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|_, row| row.expires_at > cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(hash: &str, user_id: Id, ttl_secs: i64) -> NewRefreshToken {
        let now = Utc::now();
        NewRefreshToken {
            token_hash: hash.to_string(),
            user_id,
            user_agent: None,
            ip_address: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn test_revoke_flips_once() {
        let store = MemoryRefreshTokenStore::new();
        store.insert(token("h1", 1, 60)).await.unwrap();

        assert!(store.revoke("h1").await.unwrap());
        assert!(!store.revoke("h1").await.unwrap());
        assert!(!store.revoke("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_active_excludes_revoked_and_expired() {
        let store = MemoryRefreshTokenStore::new();
        store.insert(token("live", 1, 60)).await.unwrap();
        store.insert(token("dead", 1, -60)).await.unwrap();
        store.insert(token("gone", 1, 60)).await.unwrap();
        store.revoke("gone").await.unwrap();
        store.insert(token("other", 2, 60)).await.unwrap();

        let active = store.list_active_for_user(1, Utc::now()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_hash, "live");
    }

    #[tokio::test]
    async fn test_delete_expired_before() {
        let store = MemoryRefreshTokenStore::new();
        store.insert(token("old", 1, -3600)).await.unwrap();
        store.insert(token("new", 1, 3600)).await.unwrap();

        let deleted = store.delete_expired_before(Utc::now()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find_by_hash("old").await.unwrap().is_none());
        assert!(store.find_by_hash("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_lookup_is_case_insensitive() {
        let store = MemoryCredentialStore::new();
        store.insert_user(UserRecord {
            id: 1,
            login: "Admin".into(),
            mail: "admin@example.com".into(),
            hashed_password: None,
            role_id: 1,
            active: true,
            last_login_at: None,
        });

        assert!(store.find_user_by_login("admin").await.unwrap().is_some());
        assert!(store.find_user_by_login("ADMIN").await.unwrap().is_some());
        assert!(store.find_user_by_login("nobody").await.unwrap().is_none());
    }
}
