//! Ticket handlers
//!
//! Plain CRUD; the interesting part is the access rule. Holders of the wide
//! `*_all_tickets` permissions (and admins) operate on every ticket,
//! everyone else only on tickets they requested.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use hd_auth::permissions::names;
use hd_core::Id;
use hd_db::{CreateTicketDto, Pagination, TicketRow, UpdateTicketDto};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AuthenticatedUser, DirectoryState};
use crate::handlers::users::ListParams;

const DEFAULT_STATUS: &str = "open";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub id: i64,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub requester_id: i64,
    pub assignee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TicketRow> for TicketResponse {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            subject: row.subject,
            description: row.description,
            status: row.status,
            requester_id: row.requester_id,
            assignee_id: row.assignee_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    #[validate(length(min = 1, max = 255))]
    pub subject: String,

    #[serde(default)]
    pub description: String,

    pub assignee_id: Option<Id>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Present-and-null clears the assignee; absent leaves it untouched
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Id>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Id>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Option::<Id>::deserialize(deserializer).map(Some)
}

/// List tickets: everything for wide viewers, own tickets for everyone else
///
/// GET /api/v1/tickets
pub async fn list_tickets(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(params.limit.unwrap_or(50), params.offset);

    let rows = if user.has_permission(names::VIEW_ALL_TICKETS) {
        state.tickets.find_all(pagination).await?
    } else {
        state.tickets.find_by_requester(user.id, pagination).await?
    };

    let tickets: Vec<TicketResponse> = rows.into_iter().map(TicketResponse::from).collect();
    Ok(Json(tickets))
}

/// Get a single ticket
///
/// GET /api/v1/tickets/:id
pub async fn get_ticket(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .tickets
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;

    if !user.can_access_resource(names::VIEW_ALL_TICKETS, row.requester_id) {
        return Err(ApiError::forbidden("You may not access this ticket"));
    }

    Ok(Json(TicketResponse::from(row)))
}

/// File a ticket; the requester is always the authenticated user
///
/// POST /api/v1/tickets
pub async fn create_ticket(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let row = state
        .tickets
        .create(CreateTicketDto {
            subject: body.subject,
            description: body.description,
            status: DEFAULT_STATUS.to_string(),
            requester_id: user.id,
            assignee_id: body.assignee_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TicketResponse::from(row))))
}

/// Update a ticket
///
/// PATCH /api/v1/tickets/:id
pub async fn update_ticket(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<UpdateTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .tickets
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;

    if !user.can_access_resource(names::EDIT_ALL_TICKETS, row.requester_id) {
        return Err(ApiError::forbidden("You may not access this ticket"));
    }

    let row = state
        .tickets
        .update(
            id,
            UpdateTicketDto {
                subject: body.subject,
                description: body.description,
                status: body.status,
                assignee_id: body.assignee_id,
            },
        )
        .await?;

    Ok(Json(TicketResponse::from(row)))
}

/// Delete a ticket
///
/// DELETE /api/v1/tickets/:id
pub async fn delete_ticket(
    State(state): State<DirectoryState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .tickets
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;

    if !user.can_access_resource(names::DELETE_TICKETS, row.requester_id) {
        return Err(ApiError::forbidden("You may not access this ticket"));
    }

    state.tickets.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
