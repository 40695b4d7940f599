//! Helpdesk RS Server
//!
//! HTTP server binary: configuration, database pool, auth core wiring,
//! background token sweeping, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hd_api::{api_router, AuthState, DirectoryState};
use hd_auth::{
    AccessTokenService, Argon2PasswordHasher, LoginRateLimiter, RequestGate, TokenAuthority,
};
use hd_core::AppConfig;
use hd_db::{
    Database, DatabaseConfig, PgCredentialStore, PgRefreshTokenStore, RoleRepository,
    TicketRepository, UserRepository,
};

mod bootstrap;
mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting Helpdesk RS"
    );

    if config.auth.jwt_secret == "change-me-in-production" {
        tracing::warn!("JWT_SECRET not set, running with the default signing secret");
    }

    // The auth core has no degraded mode; without a database there is nothing
    // to serve.
    let db = Database::connect(&DatabaseConfig::from_app_config(&config.database)).await?;
    db.migrate().await?;
    info!("Connected to database");

    let hasher = Arc::new(Argon2PasswordHasher::new());
    bootstrap::seed_admin(&db, hasher.as_ref()).await?;

    // Auth core wiring
    let store_timeout = Duration::from_secs(config.auth.store_timeout_seconds);
    let access = AccessTokenService::with_ttl(
        config.auth.jwt_secret.as_bytes(),
        config.auth.access_token_ttl_seconds,
    );
    let credentials = Arc::new(PgCredentialStore::new(db.pool().clone()));
    let refresh_store = Arc::new(PgRefreshTokenStore::new(db.pool().clone()));

    let authority = Arc::new(
        TokenAuthority::new(access.clone(), refresh_store, credentials.clone())
            .with_refresh_ttl(config.auth.refresh_token_ttl_seconds)
            .with_store_timeout(store_timeout),
    );
    let gate = Arc::new(
        RequestGate::new(access, credentials.clone()).with_store_timeout(store_timeout),
    );
    let limiter = Arc::new(LoginRateLimiter::new(
        config.auth.login_max_attempts,
        Duration::from_secs(config.auth.login_window_seconds),
    ));

    let auth_state = AuthState {
        gate: gate.clone(),
        authority: authority.clone(),
        credentials,
        hasher: hasher.clone(),
        limiter,
    };
    let directory_state = DirectoryState {
        gate,
        authority: authority.clone(),
        hasher,
        users: UserRepository::new(db.pool().clone()),
        roles: RoleRepository::new(db.pool().clone()),
        tickets: TicketRepository::new(db.pool().clone()),
    };

    spawn_token_sweeper(authority, config.auth.sweep_interval_seconds);

    let app = build_router(auth_state, directory_state, health::HealthState { db });

    let addr = config.server_addr();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hd_server=debug,hd_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Build the application router
fn build_router(
    auth_state: AuthState,
    directory_state: DirectoryState,
    health_state: health::HealthState,
) -> Router {
    Router::new()
        .merge(health::router(health_state))
        .merge(api_router(auth_state, directory_state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// Periodically drop expired refresh token rows, off the request path
fn spawn_token_sweeper(authority: Arc<TokenAuthority>, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(60)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = authority.sweep_expired().await {
                tracing::warn!(error = %e, "token sweep failed");
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
