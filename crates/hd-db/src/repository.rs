//! Repository error types and shared query helpers

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl RepositoryError {
    /// Whether the underlying database error is a unique-constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RepositoryError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            RepositoryError::Conflict(_) => true,
            _ => false,
        }
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, 500),
            offset: offset.max(0),
        }
    }
}
