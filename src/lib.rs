pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::{Router, http::header, routing::get};
use db::Database;
use jwt::JwtConfig;
use password::PasswordHasher;
use rate_limit::RateLimitConfig;
use session::SessionManager;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

pub struct ServerConfig {
    /// Base path for the API routes (e.g., "/api")
    pub base: Option<String>,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Access and refresh signing keys
    pub jwt: Arc<JwtConfig>,
    /// Password hasher with the configured bcrypt cost
    pub hasher: PasswordHasher,
    /// Login/register attempts allowed per client IP per minute (unlimited if None)
    pub login_rate_limit: Option<NonZeroU32>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let sessions = SessionManager::new(
        config.db.clone(),
        config.jwt.clone(),
        config.hasher.clone(),
    );

    let rate_limit = config
        .login_rate_limit
        .map(|per_minute| Arc::new(RateLimitConfig::per_minute(per_minute)));

    let api_router = create_api_router(
        config.db.clone(),
        sessions,
        config.jwt.clone(),
        rate_limit,
    );

    let router = match config.base.as_deref() {
        Some(base) if !base.is_empty() && base != "/" => Router::new().nest(base, api_router),
        _ => api_router,
    };

    router
        .route("/ping", get(api::ping))
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database, jwt: &JwtConfig) {
    let clock = jwt.clock();
    cleanup::run_cleanup(db, clock.as_ref()).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), clock);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
