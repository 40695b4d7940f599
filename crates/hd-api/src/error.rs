//! API error handling
//!
//! Wraps the core taxonomy from `hd-core` into axum responses. Authentication
//! failures stay undifferentiated all the way out: every 401 body reads the
//! same. Backend detail goes to the logs, never to the client.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hd_auth::{AuthError, StoreError};
use hd_core::HdError;
use hd_db::RepositoryError;
use serde::Serialize;

/// API error: the core taxonomy plus HTTP rendering
#[derive(Debug)]
pub struct ApiError(HdError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(HdError::bad_request(msg))
    }

    pub fn unauthorized() -> Self {
        Self(HdError::Unauthenticated)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(HdError::forbidden(msg))
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self(HdError::NotFound {
            entity,
            field: "id",
            value: id.to_string(),
        })
    }

    pub fn safety_violation(msg: impl Into<String>) -> Self {
        Self(HdError::safety_violation(msg))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(HdError::conflict(msg))
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self(HdError::RateLimited {
            retry_after_seconds,
        })
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self(HdError::Internal(msg.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn message(&self) -> String {
        match &self.0 {
            // Backend detail stays in the logs.
            HdError::Database(_) | HdError::Internal(_) | HdError::Config(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<HdError> for ApiError {
    fn from(err: HdError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.0.error_code(),
            message: self.message(),
        });

        match self.0 {
            HdError::RateLimited {
                retry_after_seconds,
            } => (
                status,
                [(header::RETRY_AFTER, retry_after_seconds.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => Self(HdError::Unauthenticated),
            AuthError::Forbidden => {
                Self(HdError::forbidden("You are not authorized to perform this action"))
            }
            AuthError::Unavailable(detail) => Self(HdError::Database(detail)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(HdError::Database(err.to_string()))
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self(HdError::NotFound {
                entity,
                field: "id",
                value: id.to_string(),
            }),
            RepositoryError::Conflict(msg) => Self(HdError::conflict(msg)),
            RepositoryError::Database(e) => Self(HdError::Database(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::unauthorized().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden("no").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::safety_violation("last admin").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("User", 3).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::rate_limited(60).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_auth_error_conversion() {
        assert_eq!(
            ApiError::from(AuthError::Unauthenticated).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::Unavailable("db down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_error_conversion() {
        let err = ApiError::from(RepositoryError::NotFound {
            entity: "Ticket",
            id: 9,
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.message().contains("Ticket"));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err = ApiError::internal("connection refused to 10.0.0.3:5432");
        assert_eq!(err.message(), "Internal server error");
        assert!(!ApiError::from(StoreError::Backend("secret dsn".into()))
            .message()
            .contains("secret"));
    }

    #[test]
    fn test_unauthenticated_message_is_generic() {
        assert_eq!(ApiError::unauthorized().message(), "Authentication required");
    }
}
