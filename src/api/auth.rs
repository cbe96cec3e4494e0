//! Account and session endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Exchange email and password for an access/refresh pair
//! - POST `/refresh` - Exchange a refresh token for a new pair
//! - POST `/logout` - Revoke the caller's refresh token (bearer auth)

use axum::{
    Json, Router, extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::MessageResponse;
use super::error::{ApiError, ApiJson};
use crate::auth::{Auth, require_auth};
use crate::db::PublicUser;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionManager,
    pub jwt: Arc<JwtConfig>,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let credentials = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));

    let credentials = match state.rate_limit.clone() {
        Some(config) => {
            credentials.layer(middleware::from_fn_with_state(config, rate_limit_auth))
        }
        None => credentials,
    };

    let protected = Router::new()
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<AuthState>,
        ));

    Router::new()
        .route("/refresh", post(refresh))
        .merge(credentials)
        .merge(protected)
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: PublicUser,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: PublicUser,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

async fn register(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .sessions
        .register(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

async fn login(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(LoginResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        user: outcome.user,
    }))
}

async fn refresh(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.refresh_token.is_empty() {
        return Err(ApiError::bad_request("Invalid request data"));
    }

    let pair = state.sessions.refresh(&payload.refresh_token).await?;

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

async fn logout(
    State(state): State<AuthState>,
    Auth(user): Auth,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(&user.username).await?;

    Ok(Json(MessageResponse {
        message: "Logged out successfully",
    }))
}
