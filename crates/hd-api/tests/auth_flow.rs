//! End-to-end tests of the authentication HTTP flow, driven through the auth
//! router against the in-memory stores.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use hd_api::{auth_router, AuthState};
use hd_auth::{
    AccessTokenService, Argon2PasswordHasher, LoginRateLimiter, MemoryCredentialStore,
    MemoryRefreshTokenStore, PasswordHasher, RequestGate, RoleRecord, TokenAuthority, UserRecord,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &[u8] = b"test-secret-key-at-least-32-bytes";

struct TestEnv {
    app: Router,
    credentials: Arc<MemoryCredentialStore>,
}

fn test_env() -> TestEnv {
    let hasher = Arc::new(Argon2PasswordHasher::new());

    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.insert_role(RoleRecord {
        id: 1,
        name: "Administrator".into(),
        admin: true,
        system: true,
        permissions: HashSet::new(),
    });
    credentials.insert_user(UserRecord {
        id: 1,
        login: "admin".into(),
        mail: "admin@example.com".into(),
        hashed_password: Some(hasher.hash("admin123").unwrap()),
        role_id: 1,
        active: true,
        last_login_at: None,
    });

    let access = AccessTokenService::new(SECRET);
    let refresh_store = Arc::new(MemoryRefreshTokenStore::new());
    let authority = Arc::new(TokenAuthority::new(
        access.clone(),
        refresh_store,
        credentials.clone(),
    ));
    let gate = Arc::new(RequestGate::new(access, credentials.clone()));
    let limiter = Arc::new(LoginRateLimiter::new(5, Duration::from_secs(60)));

    let state = AuthState {
        gate,
        authority,
        credentials: credentials.clone(),
        hasher,
        limiter,
    };

    TestEnv {
        app: Router::new().nest("/api/v1", auth_router(state)),
        credentials,
    }
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "/api/v1/auth/login",
            serde_json::json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_returns_token_pair() {
    let env = test_env();

    let response = login(&env.app, "admin", "admin123").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["tokenType"], "Bearer");
}

#[tokio::test]
async fn test_me_returns_sanitized_profile() {
    let env = test_env();

    let tokens = body_json(login(&env.app, "admin", "admin123").await).await;
    let access = tokens["accessToken"].as_str().unwrap();

    let response = env
        .app
        .clone()
        .oneshot(get_request("/api/v1/me", Some(access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["username"], "admin");
    assert_eq!(body["isAdmin"], true);
    // No password material in the profile, under any key.
    let rendered = body.to_string().to_lowercase();
    assert!(!rendered.contains("password"));
    assert!(!rendered.contains("argon2"));
}

#[tokio::test]
async fn test_refresh_rotates_the_token() {
    let env = test_env();

    let tokens = body_json(login(&env.app, "admin", "admin123").await).await;
    let original = tokens["refreshToken"].as_str().unwrap().to_string();

    let response = env
        .app
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refreshToken": original }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = body_json(response).await;
    assert_ne!(rotated["refreshToken"].as_str().unwrap(), original);

    // The original refresh token died with the rotation.
    let replay = env
        .app
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refreshToken": original }),
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let env = test_env();

    let tokens = body_json(login(&env.app, "admin", "admin123").await).await;
    let refresh = tokens["refreshToken"].as_str().unwrap().to_string();

    let response = env
        .app
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/logout",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let replay = env
        .app
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/refresh",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_empties_sessions() {
    let env = test_env();

    let first = body_json(login(&env.app, "admin", "admin123").await).await;
    let _second = body_json(login(&env.app, "admin", "admin123").await).await;
    let access = first["accessToken"].as_str().unwrap();

    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/logout_all")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["revokedSessions"], 2);

    let sessions = env
        .app
        .clone()
        .oneshot(get_request("/api/v1/auth/sessions", Some(access)))
        .await
        .unwrap();
    assert_eq!(sessions.status(), StatusCode::OK);
    assert_eq!(body_json(sessions).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized_then_throttled() {
    let env = test_env();

    for _ in 0..5 {
        let response = login(&env.app, "admin", "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Sixth attempt trips the sliding window, even with correct credentials.
    let response = login(&env.app, "admin", "admin123").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_unknown_user_is_unauthorized() {
    let env = test_env();
    let response = login(&env.app, "nobody", "whatever-123").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_fields_are_bad_request() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/login",
            serde_json::json!({ "username": "admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = env
        .app
        .clone()
        .oneshot(json_request("/api/v1/auth/refresh", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deactivation_bites_within_token_window() {
    let env = test_env();

    let tokens = body_json(login(&env.app, "admin", "admin123").await).await;
    let access = tokens["accessToken"].as_str().unwrap();

    // Token is minutes from expiry, but the live re-check rejects it.
    env.credentials.set_active(1, false);

    let response = env
        .app
        .clone()
        .oneshot(get_request("/api/v1/me", Some(access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_without_token_is_unauthorized() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(get_request("/api/v1/me", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
