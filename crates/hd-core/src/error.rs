//! Core error taxonomy for Helpdesk RS
//!
//! One enum covers every failure class a request can surface. Authentication
//! failures are deliberately undifferentiated: a bad signature, an expired
//! access token, and an unknown refresh token all collapse into
//! `Unauthenticated` so callers get no validation oracle.

use thiserror::Error;

/// Core error type for all Helpdesk operations
#[derive(Error, Debug)]
pub enum HdError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Operation rejected: {message}")]
    SafetyViolation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Standard Result type for Helpdesk operations
pub type HdResult<T> = Result<T, HdError>;

/// HTTP status code mapping for errors
impl HdError {
    pub fn status_code(&self) -> u16 {
        match self {
            HdError::NotFound { .. } => 404,
            HdError::Unauthenticated => 401,
            HdError::Forbidden { .. } => 403,
            HdError::BadRequest { .. } | HdError::SafetyViolation { .. } => 400,
            HdError::Conflict { .. } => 409,
            HdError::RateLimited { .. } => 429,
            HdError::Database(_) | HdError::Internal(_) | HdError::Config(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            HdError::NotFound { .. } => "not_found",
            HdError::Unauthenticated => "unauthenticated",
            HdError::Forbidden { .. } => "forbidden",
            HdError::BadRequest { .. } => "bad_request",
            HdError::SafetyViolation { .. } => "safety_violation",
            HdError::Conflict { .. } => "conflict",
            HdError::RateLimited { .. } => "rate_limited",
            HdError::Database(_) => "database_error",
            HdError::Internal(_) => "internal_error",
            HdError::Config(_) => "configuration_error",
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        HdError::Forbidden {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HdError::BadRequest {
            message: message.into(),
        }
    }

    pub fn safety_violation(message: impl Into<String>) -> Self {
        HdError::SafetyViolation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        HdError::Conflict {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HdError::Unauthenticated.status_code(), 401);
        assert_eq!(HdError::forbidden("no").status_code(), 403);
        assert_eq!(HdError::bad_request("missing field").status_code(), 400);
        assert_eq!(HdError::safety_violation("last admin").status_code(), 400);
        assert_eq!(HdError::Database("down".into()).status_code(), 500);
        assert_eq!(
            HdError::RateLimited {
                retry_after_seconds: 60
            }
            .status_code(),
            429
        );
    }

    #[test]
    fn test_unauthenticated_carries_no_detail() {
        // The rendered message must not hint at why authentication failed.
        assert_eq!(HdError::Unauthenticated.to_string(), "Authentication required");
    }
}
