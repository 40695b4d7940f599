//! User repository
//!
//! Database operations for user accounts. Logins and mail addresses are
//! unique case-insensitively; lookups lower-case on both sides.

use chrono::{DateTime, Utc};
use hd_core::Id;
use sqlx::{FromRow, PgPool};

use crate::repository::{Pagination, RepositoryError, RepositoryResult};

/// User database entity
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub login: String,
    pub mail: String,
    pub hashed_password: Option<String>,
    pub role_id: i64,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Convert into the record shape the auth core consumes
    pub fn into_record(self) -> hd_auth::UserRecord {
        hd_auth::UserRecord {
            id: self.id,
            login: self.login,
            mail: self.mail,
            hashed_password: self.hashed_password,
            role_id: self.role_id,
            active: self.active,
            last_login_at: self.last_login_at,
        }
    }
}

/// DTO for creating a user
#[derive(Debug, Clone)]
pub struct CreateUserDto {
    pub login: String,
    pub mail: String,
    pub hashed_password: Option<String>,
    pub role_id: Id,
    pub active: bool,
}

/// DTO for updating a user
#[derive(Debug, Clone, Default)]
pub struct UpdateUserDto {
    pub mail: Option<String>,
    pub role_id: Option<Id>,
    pub active: Option<bool>,
}

const USER_COLUMNS: &str = "id, login, mail, hashed_password, role_id, active, \
                            last_login_at, created_at, updated_at";

/// User repository implementation
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_login(&self, login: &str) -> RepositoryResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(login) = LOWER($1)"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_mail(&self, mail: &str) -> RepositoryResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(mail) = LOWER($1)"
        ))
        .bind(mail)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_all(&self, pagination: Pagination) -> RepositoryResult<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY login ASC LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every user, for invariant checks that need the full directory
    pub async fn find_all_unpaged(&self) -> RepositoryResult<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn create(&self, dto: CreateUserDto) -> RepositoryResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (login, mail, hashed_password, role_id, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&dto.login)
        .bind(&dto.mail)
        .bind(&dto.hashed_password)
        .bind(dto.role_id)
        .bind(dto.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update(&self, id: Id, dto: UpdateUserDto) -> RepositoryResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                mail = COALESCE($1, mail),
                role_id = COALESCE($2, role_id),
                active = COALESCE($3, active),
                updated_at = NOW()
            WHERE id = $4
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&dto.mail)
        .bind(dto.role_id)
        .bind(dto.active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound { entity: "User", id })?;

        Ok(row)
    }

    pub async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "User", id });
        }

        Ok(())
    }

    pub async fn update_last_login(&self, id: Id, at: DateTime<Utc>) -> RepositoryResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn update_password(&self, id: Id, hashed_password: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(hashed_password)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "User", id });
        }

        Ok(())
    }

    pub async fn is_login_taken(&self, login: &str, exclude_id: Option<Id>) -> RepositoryResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(login) = LOWER($1) AND id != COALESCE($2, -1))",
        )
        .bind(login)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }

    pub async fn is_mail_taken(&self, mail: &str, exclude_id: Option<Id>) -> RepositoryResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(mail) = LOWER($1) AND id != COALESCE($2, -1))",
        )
        .bind(mail)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_record() {
        let now = Utc::now();
        let row = UserRow {
            id: 3,
            login: "agent".into(),
            mail: "agent@example.com".into(),
            hashed_password: Some("$argon2id$...".into()),
            role_id: 2,
            active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        let record = row.into_record();
        assert_eq!(record.id, 3);
        assert_eq!(record.role_id, 2);
        assert!(record.active);
        assert_eq!(record.hashed_password.as_deref(), Some("$argon2id$..."));
    }
}
