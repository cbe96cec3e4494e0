//! Authentication user types.

/// Identity attached to a request by the auth gate.
///
/// Only the username from the token subject is carried; handlers that need
/// the user row look it up themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}
