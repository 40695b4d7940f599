//! Postgres credential store
//!
//! Implements the `hd-auth` credential contract on top of the user and role
//! repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hd_auth::{CredentialStore, RoleRecord, StoreError, UserRecord};
use hd_core::Id;
use sqlx::PgPool;

use crate::repository::RepositoryError;
use crate::roles::RoleRepository;
use crate::users::UserRepository;

/// Credential lookups backed by Postgres
#[derive(Clone)]
pub struct PgCredentialStore {
    users: UserRepository,
    roles: RoleRepository,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            roles: RoleRepository::new(pool),
        }
    }
}

fn backend(e: RepositoryError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_id(&self, id: Id) -> Result<Option<UserRecord>, StoreError> {
        let row = self.users.find_by_id(id).await.map_err(backend)?;
        Ok(row.map(|r| r.into_record()))
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = self.users.find_by_login(login).await.map_err(backend)?;
        Ok(row.map(|r| r.into_record()))
    }

    async fn find_role_by_id(&self, id: Id) -> Result<Option<RoleRecord>, StoreError> {
        let Some(row) = self.roles.find_by_id(id).await.map_err(backend)? else {
            return Ok(None);
        };
        let permissions = self.roles.get_permissions(id).await.map_err(backend)?;
        Ok(Some(row.into_record(permissions)))
    }

    async fn update_last_login(&self, id: Id, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.users.update_last_login(id, at).await.map_err(backend)
    }
}
