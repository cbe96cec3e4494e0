//! Authentication state trait and macro.

use crate::jwt::JwtConfig;

/// Trait for state types that can validate access tokens.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
}

/// Macro to implement `HasAuthBackend` for state structs with a
/// `jwt: Arc<JwtConfig>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub jwt: Arc<JwtConfig>,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
        }
    };
}
