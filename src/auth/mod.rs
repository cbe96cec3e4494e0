//! Bearer-token authorization for protected routes.
//!
//! `require_auth` runs as a route layer in front of protected handlers. It
//! validates the access token from the `Authorization` header and stores an
//! [`AuthenticatedUser`] in the request extensions, which handlers pull out
//! with the [`Auth`] extractor.

mod errors;
mod extractors;
mod middleware;
mod state;
mod types;

pub use errors::ApiAuthError;
pub use extractors::Auth;
pub use middleware::{parse_bearer, require_auth};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
