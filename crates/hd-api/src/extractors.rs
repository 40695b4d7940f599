//! Axum extractors and application state

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use hd_auth::{
    CredentialStore, CurrentUser, LoginRateLimiter, PasswordHasher, RequestGate, RequestHeaders,
    TokenAuthority,
};
use hd_db::{RoleRepository, TicketRepository, UserRepository};
use std::sync::Arc;

use crate::error::ApiError;

/// State for the authentication endpoints. Built entirely on the `hd-auth`
/// storage contracts, so tests can swap in the in-memory stores.
#[derive(Clone, FromRef)]
pub struct AuthState {
    pub gate: Arc<RequestGate>,
    pub authority: Arc<TokenAuthority>,
    pub credentials: Arc<dyn CredentialStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub limiter: Arc<LoginRateLimiter>,
}

/// State for the user/role/ticket directory endpoints
#[derive(Clone, FromRef)]
pub struct DirectoryState {
    pub gate: Arc<RequestGate>,
    pub authority: Arc<TokenAuthority>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub users: UserRepository,
    pub roles: RoleRepository,
    pub tickets: TicketRepository,
}

/// Build the auth-relevant header view from an axum header map
pub fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    RequestHeaders {
        authorization: get("authorization"),
        user_agent: get("user-agent"),
        forwarded_for: get("x-forwarded-for"),
    }
}

/// Authenticated user extractor: runs the request gate, rejecting with 401
/// before the handler body executes.
pub struct AuthenticatedUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<RequestGate>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = <Arc<RequestGate> as FromRef<S>>::from_ref(state);
        let headers = request_headers(&parts.headers);
        let user = gate.authenticate(&headers).await?;
        Ok(AuthenticatedUser(user))
    }
}

impl std::ops::Deref for AuthenticatedUser {
    type Target = CurrentUser;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
