//! Health endpoints
//!
//! Liveness answers as long as the process runs; readiness additionally
//! pings the database.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use hd_db::Database;

#[derive(Clone)]
pub struct HealthState {
    pub db: Database,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "down" })),
            )
        }
    }
}
