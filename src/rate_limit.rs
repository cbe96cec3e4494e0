//! Rate limiting for login and registration.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down
//! password guessing and signup spam.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Shared by login and register
    pub credentials: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Allow `per_minute` credential requests per client IP.
    pub fn per_minute(per_minute: NonZeroU32) -> Self {
        Self {
            credentials: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }
}

/// Client IP from the connection, or "unknown" when the server was not
/// started with connect info (as in router-level tests).
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware for rate limiting login and register.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&request);

    match config.credentials.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Credential rate limit exceeded");
            ApiError::too_many_requests(
                "Too many authentication attempts. Please wait before trying again.",
            )
            .into_response()
        }
    }
}
