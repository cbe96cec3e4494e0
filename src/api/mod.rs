mod auth;
mod comments;
mod error;
mod posts;

use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionManager;

pub use auth::AuthState;
pub use error::{ApiError, ApiJson, ResultExt};

/// State for post and comment endpoints.
#[derive(Clone)]
pub struct ContentState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(ContentState);

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Create the API router.
pub fn create_api_router(
    db: Database,
    sessions: SessionManager,
    jwt: Arc<JwtConfig>,
    rate_limit: Option<Arc<RateLimitConfig>>,
) -> Router {
    let auth_state = AuthState {
        sessions,
        jwt: jwt.clone(),
        rate_limit,
    };

    let content_state = ContentState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/posts", posts::router(content_state.clone()))
        .nest("/comments", comments::router(content_state))
}

/// Liveness check. Mounted outside the base path.
pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse { message: "pong" })
}

/// Resolve the authenticated username to its user ID.
async fn current_user_id(db: &Database, username: &str) -> Result<i64, ApiError> {
    db.users()
        .get_by_username(username)
        .await
        .db_err("Failed to get user")?
        .map(|user| user.id)
        .ok_or_else(|| ApiError::unauthorized("User not found"))
}
