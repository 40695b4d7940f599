//! Ticket repository
//!
//! Plain CRUD over ticket rows. Ownership (the requester) is what the
//! permission layer checks against; no workflow logic lives here.

use chrono::{DateTime, Utc};
use hd_core::Id;
use sqlx::{FromRow, PgPool};

use crate::repository::{Pagination, RepositoryError, RepositoryResult};

/// Ticket database entity
#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: i64,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub requester_id: i64,
    pub assignee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for creating a ticket
#[derive(Debug, Clone)]
pub struct CreateTicketDto {
    pub subject: String,
    pub description: String,
    pub status: String,
    pub requester_id: Id,
    pub assignee_id: Option<Id>,
}

/// DTO for updating a ticket
#[derive(Debug, Clone, Default)]
pub struct UpdateTicketDto {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub assignee_id: Option<Option<Id>>,
}

const TICKET_COLUMNS: &str =
    "id, subject, description, status, requester_id, assignee_id, created_at, updated_at";

/// Ticket repository implementation
#[derive(Clone)]
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<TicketRow>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_all(&self, pagination: Pagination) -> RepositoryResult<Vec<TicketRow>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Tickets requested by one user
    pub async fn find_by_requester(
        &self,
        requester_id: Id,
        pagination: Pagination,
    ) -> RepositoryResult<Vec<TicketRow>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            SELECT {TICKET_COLUMNS} FROM tickets
            WHERE requester_id = $1
            ORDER BY id DESC LIMIT $2 OFFSET $3
            "#
        ))
        .bind(requester_id)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn create(&self, dto: CreateTicketDto) -> RepositoryResult<TicketRow> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            INSERT INTO tickets
                (subject, description, status, requester_id, assignee_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(&dto.subject)
        .bind(&dto.description)
        .bind(&dto.status)
        .bind(dto.requester_id)
        .bind(dto.assignee_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update(&self, id: Id, dto: UpdateTicketDto) -> RepositoryResult<TicketRow> {
        // assignee_id distinguishes "leave as is" (None) from "clear" (Some(None)).
        let (set_assignee, assignee) = match dto.assignee_id {
            Some(value) => (true, value),
            None => (false, None),
        };

        let row = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            UPDATE tickets SET
                subject = COALESCE($1, subject),
                description = COALESCE($2, description),
                status = COALESCE($3, status),
                assignee_id = CASE WHEN $4 THEN $5 ELSE assignee_id END,
                updated_at = NOW()
            WHERE id = $6
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(&dto.subject)
        .bind(&dto.description)
        .bind(&dto.status)
        .bind(set_assignee)
        .bind(assignee)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound { entity: "Ticket", id })?;

        Ok(row)
    }

    pub async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "Ticket", id });
        }

        Ok(())
    }
}
