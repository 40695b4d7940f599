//! User administration handlers
//!
//! CRUD over user accounts, guarded by `manage_users`. Deleting or
//! deactivating an admin-role user must leave at least one active admin
//! behind; the check runs against the full directory in one place.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use hd_auth::{gate, last_admin_survives, permissions::names, RoleRecord, UserRecord};
use hd_core::Id;
use hd_db::{CreateUserDto, Pagination, UpdateUserDto, UserRow};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AuthenticatedUser, DirectoryState};

/// Sanitized user representation; password material never leaves the server
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role_id: i64,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.login,
            email: row.mail,
            role_id: row.role_id,
            active: row.active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8))]
    pub password: String,

    pub role_id: Id,

    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub role_id: Option<Id>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,

    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub offset: i64,
    pub limit: Option<i64>,
}

fn validate(input: &impl Validate) -> ApiResult<()> {
    input
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Full directory as auth-core records, for the last-admin invariant
async fn directory_records(
    state: &DirectoryState,
) -> ApiResult<(Vec<UserRecord>, Vec<RoleRecord>)> {
    let users = state
        .users
        .find_all_unpaged()
        .await?
        .into_iter()
        .map(UserRow::into_record)
        .collect();
    let roles = state.roles.find_all_records().await?;
    Ok((users, roles))
}

/// Reject an update/delete that would leave the system without an active
/// admin-role user.
async fn ensure_admin_survives(state: &DirectoryState, candidate_id: Id) -> ApiResult<()> {
    let (users, roles) = directory_records(state).await?;
    if !last_admin_survives(candidate_id, &users, &roles) {
        return Err(ApiError::safety_violation(
            "Cannot remove or deactivate the last active administrator",
        ));
    }
    Ok(())
}

/// List users
///
/// GET /api/v1/users
pub async fn list_users(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_USERS)?;

    let pagination = Pagination::new(params.limit.unwrap_or(50), params.offset);
    let rows = state.users.find_all(pagination).await?;
    let users: Vec<UserResponse> = rows.into_iter().map(UserResponse::from).collect();

    Ok(Json(users))
}

/// Get a single user
///
/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    if user.id != id {
        gate::require_permission(&user, names::MANAGE_USERS)?;
    }

    let row = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(UserResponse::from(row)))
}

/// Create a user
///
/// POST /api/v1/users
pub async fn create_user(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_USERS)?;
    validate(&body)?;

    if state.roles.find_by_id(body.role_id).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Role with id {} does not exist",
            body.role_id
        )));
    }
    if state.users.is_login_taken(&body.username, None).await? {
        return Err(ApiError::conflict("Username is already taken"));
    }
    if state.users.is_mail_taken(&body.email, None).await? {
        return Err(ApiError::conflict("Email is already taken"));
    }

    let hashed = state
        .hasher
        .hash(&body.password)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let row = state
        .users
        .create(CreateUserDto {
            login: body.username,
            mail: body.email,
            hashed_password: Some(hashed),
            role_id: body.role_id,
            active: body.active,
        })
        .await?;

    tracing::info!(created_by = user.id, user_id = row.id, "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(row))))
}

/// Update a user
///
/// PATCH /api/v1/users/:id
pub async fn update_user(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_USERS)?;
    validate(&body)?;

    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    if let Some(email) = &body.email {
        if state.users.is_mail_taken(email, Some(id)).await? {
            return Err(ApiError::conflict("Email is already taken"));
        }
    }

    let new_role = match body.role_id {
        Some(role_id) => Some(
            state
                .roles
                .find_by_id(role_id)
                .await?
                .ok_or_else(|| ApiError::bad_request(format!("Role with id {role_id} does not exist")))?,
        ),
        None => None,
    };

    // Deactivating an admin or moving them to a non-admin role both count as
    // losing an admin; either path must leave another one standing.
    let target_role_is_admin = state
        .roles
        .find_by_id(target.role_id)
        .await?
        .map(|r| r.admin)
        .unwrap_or(false);
    let deactivating = target.active && body.active == Some(false);
    let demoting = target_role_is_admin && new_role.as_ref().map(|r| !r.admin).unwrap_or(false);
    if target_role_is_admin && (deactivating || demoting) {
        ensure_admin_survives(&state, id).await?;
    }

    let row = state
        .users
        .update(
            id,
            UpdateUserDto {
                mail: body.email,
                role_id: body.role_id,
                active: body.active,
            },
        )
        .await?;

    Ok(Json(UserResponse::from(row)))
}

/// Delete a user
///
/// DELETE /api/v1/users/:id
pub async fn delete_user(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_USERS)?;

    if user.id == id {
        return Err(ApiError::conflict("You cannot delete your own account"));
    }

    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let target_role_is_admin = state
        .roles
        .find_by_id(target.role_id)
        .await?
        .map(|r| r.admin)
        .unwrap_or(false);
    if target_role_is_admin {
        ensure_admin_survives(&state, id).await?;
    }

    // Outstanding sessions die with the account.
    state.authority.revoke_all(id).await?;
    state.users.delete(id).await?;

    tracing::info!(deleted_by = user.id, user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Change a user's password
///
/// PUT /api/v1/users/:id/password
///
/// Self-service requires the current password; admins may reset without it.
/// Every refresh token of the user is revoked afterwards.
pub async fn change_password(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&body)?;

    let is_self = user.id == id;
    if !is_self {
        gate::require_permission(&user, names::MANAGE_USERS)?;
    }

    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    if is_self {
        let current = body
            .current_password
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("currentPassword is required"))?;
        let verified = target
            .hashed_password
            .as_deref()
            .map(|stored| state.hasher.verify(current, stored))
            .unwrap_or(false);
        if !verified {
            return Err(ApiError::unauthorized());
        }
    }

    let hashed = state
        .hasher
        .hash(&body.new_password)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    state.users.update_password(id, &hashed).await?;
    state.authority.revoke_all(id).await?;

    tracing::info!(changed_by = user.id, user_id = id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
