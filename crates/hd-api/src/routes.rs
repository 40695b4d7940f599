//! API routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::extractors::{AuthState, DirectoryState};
use crate::handlers::{auth, roles, tickets, users};

/// Authentication routes, nested under /api/v1
pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout_all", post(auth::logout_all))
        .route("/auth/sessions", get(auth::sessions))
        .route("/me", get(auth::me))
        .with_state(state)
}

/// User/role/ticket directory routes, nested under /api/v1
pub fn directory_router(state: DirectoryState) -> Router {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/password", put(users::change_password))
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/roles/:id",
            get(roles::get_role)
                .patch(roles::update_role)
                .delete(roles::delete_role),
        )
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route(
            "/tickets/:id",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .with_state(state)
}

/// Compose the full API under /api/v1
pub fn api_router(auth_state: AuthState, directory_state: DirectoryState) -> Router {
    let v1 = Router::new()
        .merge(auth_router(auth_state))
        .merge(directory_router(directory_state));

    Router::new().nest("/api/v1", v1)
}
