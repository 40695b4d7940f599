//! # hd-api
//!
//! HTTP surface for Helpdesk RS: axum handlers, routers, request extractors,
//! and the mapping from core errors onto response statuses.
//!
//! The auth endpoints operate purely on the `hd-auth` storage contracts, so
//! they run against either the Postgres stores or the in-memory ones; the
//! directory endpoints (users, roles, tickets) work on the concrete `hd-db`
//! repositories.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use extractors::{AuthState, AuthenticatedUser, DirectoryState};
pub use routes::{api_router, auth_router, directory_router};
