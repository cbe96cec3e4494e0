//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

/// Why a request was turned away. Only logged; clients always see the same
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    MissingHeader,
    MalformedHeader,
    InvalidToken,
    /// The gate did not run for this route.
    NotAuthenticated,
}

/// Rejection from the gate or the [`Auth`](super::Auth) extractor.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        debug!(reason = ?self.kind, "Request rejected by auth gate");

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized",
            }),
        )
            .into_response()
    }
}
