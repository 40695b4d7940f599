//! Authentication handlers
//!
//! Login, refresh, logout, session listing, and the current-user profile.
//! Everything here talks to the token authority and the storage contracts
//! only; no direct database access.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extractors::{request_headers, AuthState, AuthenticatedUser};

/// Token pair response, shared by login and refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: &'static str,
}

impl From<hd_auth::IssuedTokens> for TokenResponse {
    fn from(issued: hd_auth::IssuedTokens) -> Self {
        Self {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            expires_in: issued.expires_in,
            token_type: "Bearer",
        }
    }
}

/// Sanitized profile of the authenticated user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role_id: i64,
    pub is_admin: bool,
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Log in with username and password
///
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = required(body.username, "username")?;
    let password = required(body.password, "password")?;

    let request = request_headers(&headers);
    let ip = request.client_ip();

    if !state.limiter.check(&username, ip) {
        tracing::warn!(%username, "login throttled");
        return Err(ApiError::rate_limited(state.limiter.retry_after_seconds()));
    }

    let user = state.credentials.find_user_by_login(&username).await?;

    // Verify against the stored hash; a missing user or empty credential
    // fails the same way as a wrong password.
    let verified = match user.as_ref().and_then(|u| u.hashed_password.as_deref()) {
        Some(stored) => state.hasher.verify(&password, stored),
        None => false,
    };
    let Some(user) = user.filter(|_| verified) else {
        state.limiter.record_failure(&username, ip);
        return Err(ApiError::unauthorized());
    };

    if !user.active {
        tracing::debug!(user_id = user.id, "login attempt on deactivated account");
        return Err(ApiError::unauthorized());
    }

    state.limiter.record_success(&username, ip);

    let issued = state
        .authority
        .issue_tokens(&user, request.user_agent.as_deref(), ip)
        .await?;
    state.credentials.update_last_login(user.id, Utc::now()).await?;

    tracing::info!(user_id = user.id, "login succeeded");
    Ok(Json(TokenResponse::from(issued)))
}

/// Rotate a refresh token into a fresh pair
///
/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = required(body.refresh_token, "refreshToken")?;
    let request = request_headers(&headers);

    let issued = state
        .authority
        .refresh(&token, request.user_agent.as_deref(), request.client_ip())
        .await?;

    Ok(Json(TokenResponse::from(issued)))
}

/// Revoke one refresh token
///
/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AuthState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = required(body.refresh_token, "refreshToken")?;

    // Idempotent: revoking an unknown or already-revoked token is a no-op.
    state.authority.revoke(&token).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Revoke every session of the authenticated user ("logout everywhere")
///
/// POST /api/v1/auth/logout_all
pub async fn logout_all(
    State(state): State<AuthState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let revoked = state.authority.revoke_all(user.id).await?;
    tracing::info!(user_id = user.id, revoked, "logout everywhere");

    Ok(Json(serde_json::json!({ "revokedSessions": revoked })))
}

/// List the active sessions of the authenticated user
///
/// GET /api/v1/auth/sessions
pub async fn sessions(
    State(state): State<AuthState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.authority.list_active_sessions(user.id).await?;
    Ok(Json(sessions))
}

/// Current user profile
///
/// GET /api/v1/me
pub async fn me(user: AuthenticatedUser) -> ApiResult<impl IntoResponse> {
    let profile = ProfileResponse {
        id: user.id,
        username: user.login.clone(),
        email: user.mail.clone(),
        role_id: user.role_id,
        is_admin: user.is_admin(),
        permissions: user.permission_names(),
    };
    Ok(Json(profile))
}
