//! The bearer-token gate.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extract the token from an `Authorization` value of the exact form
/// `Bearer <token>`. The scheme is case-sensitive and there must be no
/// other space-separated parts.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Middleware for protected routes. Use with
/// `axum::middleware::from_fn_with_state` as a route layer.
pub async fn require_auth<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::MissingHeader))?;

    let token = header
        .to_str()
        .ok()
        .and_then(parse_bearer)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::MalformedHeader))?;

    let username = state
        .jwt()
        .validate_access(token)
        .map_err(|_| ApiAuthError::new(AuthErrorKind::InvalidToken))?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { username });

    Ok(next.run(request).await)
}
