//! Role administration handlers
//!
//! CRUD over roles, guarded by `manage_roles`. System roles are seeded, not
//! created over the API; they refuse deletion and admin-flag flips.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use hd_auth::{gate, permissions::names};
use hd_core::Id;
use hd_db::{CreateRoleDto, RoleRow, UpdateRoleDto};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AuthenticatedUser, DirectoryState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub is_admin: bool,
    pub is_system: bool,
    pub permissions: Vec<String>,
}

impl RoleResponse {
    fn from_row(row: RoleRow, mut permissions: Vec<String>) -> Self {
        permissions.sort();
        Self {
            id: row.id,
            name: row.name,
            is_admin: row.admin,
            is_system: row.system,
            permissions,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub is_admin: Option<bool>,
    pub permissions: Option<Vec<String>>,
}

/// List roles
///
/// GET /api/v1/roles
pub async fn list_roles(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_ROLES)?;

    let rows = state.roles.find_all().await?;
    let mut roles = Vec::with_capacity(rows.len());
    for row in rows {
        let permissions = state.roles.get_permissions(row.id).await?;
        roles.push(RoleResponse::from_row(row, permissions.into_iter().collect()));
    }

    Ok(Json(roles))
}

/// Get a single role
///
/// GET /api/v1/roles/:id
pub async fn get_role(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_ROLES)?;

    let row = state
        .roles
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;
    let permissions = state.roles.get_permissions(id).await?;

    Ok(Json(RoleResponse::from_row(row, permissions.into_iter().collect())))
}

/// Create a role
///
/// POST /api/v1/roles
pub async fn create_role(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_ROLES)?;
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    if state.roles.find_by_name(&body.name).await?.is_some() {
        return Err(ApiError::conflict("Role name is already taken"));
    }

    let permissions = body.permissions.clone();
    let row = state
        .roles
        .create(CreateRoleDto {
            name: body.name,
            admin: body.is_admin,
            // System roles come from seeding only.
            system: false,
            permissions: body.permissions,
        })
        .await?;

    tracing::info!(created_by = user.id, role_id = row.id, "role created");
    Ok((StatusCode::CREATED, Json(RoleResponse::from_row(row, permissions))))
}

/// Update a role
///
/// PATCH /api/v1/roles/:id
pub async fn update_role(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<UpdateRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_ROLES)?;

    let existing = state
        .roles
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;

    if existing.system {
        if let Some(is_admin) = body.is_admin {
            if is_admin != existing.admin {
                return Err(ApiError::safety_violation(
                    "The admin flag of a system role cannot be changed",
                ));
            }
        }
    }

    if let Some(name) = &body.name {
        if let Some(clash) = state.roles.find_by_name(name).await? {
            if clash.id != id {
                return Err(ApiError::conflict("Role name is already taken"));
            }
        }
    }

    let row = state
        .roles
        .update(
            id,
            UpdateRoleDto {
                name: body.name,
                admin: body.is_admin,
                permissions: body.permissions,
            },
        )
        .await?;
    let permissions = state.roles.get_permissions(id).await?;

    Ok(Json(RoleResponse::from_row(row, permissions.into_iter().collect())))
}

/// Delete a role
///
/// DELETE /api/v1/roles/:id
pub async fn delete_role(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    gate::require_permission(&user, names::MANAGE_ROLES)?;

    let existing = state
        .roles
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;

    if existing.system {
        return Err(ApiError::safety_violation("System roles cannot be deleted"));
    }
    if state.roles.count_members(id).await? > 0 {
        return Err(ApiError::conflict(
            "Role is still assigned to users and cannot be deleted",
        ));
    }

    state.roles.delete(id).await?;

    tracing::info!(deleted_by = user.id, role_id = id, "role deleted");
    Ok(StatusCode::NO_CONTENT)
}
