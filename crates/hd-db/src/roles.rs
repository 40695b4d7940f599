//! Role repository
//!
//! Roles carry an admin flag, a system-protected flag, and an explicit
//! permission set persisted in the `role_permissions` join table.

use chrono::{DateTime, Utc};
use hd_core::Id;
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;

use crate::repository::{RepositoryError, RepositoryResult};

/// Role database entity
#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub admin: bool,
    pub system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleRow {
    /// Combine with the loaded permission set into an auth-core record
    pub fn into_record(self, permissions: HashSet<String>) -> hd_auth::RoleRecord {
        hd_auth::RoleRecord {
            id: self.id,
            name: self.name,
            admin: self.admin,
            system: self.system,
            permissions,
        }
    }
}

/// DTO for creating a role
#[derive(Debug, Clone)]
pub struct CreateRoleDto {
    pub name: String,
    pub admin: bool,
    pub system: bool,
    pub permissions: Vec<String>,
}

/// DTO for updating a role
#[derive(Debug, Clone, Default)]
pub struct UpdateRoleDto {
    pub name: Option<String>,
    pub admin: Option<bool>,
    pub permissions: Option<Vec<String>>,
}

const ROLE_COLUMNS: &str = "id, name, admin, system, created_at, updated_at";

/// Role repository implementation
#[derive(Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<RoleRow>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<RoleRow>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_all(&self) -> RepositoryResult<Vec<RoleRow>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Permission names granted by a role
    pub async fn get_permissions(&self, role_id: Id) -> RepositoryResult<HashSet<String>> {
        let permissions = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions.into_iter().collect())
    }

    pub async fn create(&self, dto: CreateRoleDto) -> RepositoryResult<RoleRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            INSERT INTO roles (name, admin, system, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(&dto.name)
        .bind(dto.admin)
        .bind(dto.system)
        .fetch_one(&mut *tx)
        .await?;

        for permission in &dto.permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2)")
                .bind(row.id)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    /// Update name/admin flag and replace the permission set when provided
    pub async fn update(&self, id: Id, dto: UpdateRoleDto) -> RepositoryResult<RoleRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            UPDATE roles SET
                name = COALESCE($1, name),
                admin = COALESCE($2, admin),
                updated_at = NOW()
            WHERE id = $3
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(&dto.name)
        .bind(dto.admin)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound { entity: "Role", id })?;

        if let Some(permissions) = &dto.permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for permission in permissions {
                sqlx::query("INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2)")
                    .bind(id)
                    .bind(permission)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(row)
    }

    pub async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "Role", id });
        }

        tx.commit().await?;
        Ok(())
    }

    /// Count users referencing a role, for delete guards
    pub async fn count_members(&self, role_id: Id) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Load every role with its permission set, for invariant checks
    pub async fn find_all_records(&self) -> RepositoryResult<Vec<hd_auth::RoleRecord>> {
        let rows = self.find_all().await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let permissions = self.get_permissions(row.id).await?;
            records.push(row.into_record(permissions));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_record() {
        let now = Utc::now();
        let row = RoleRow {
            id: 2,
            name: "Agent".into(),
            admin: false,
            system: false,
            created_at: now,
            updated_at: now,
        };

        let record = row.into_record(HashSet::from(["view_tickets".to_string()]));
        assert_eq!(record.id, 2);
        assert!(!record.admin);
        assert!(record.permissions.contains("view_tickets"));
    }
}
