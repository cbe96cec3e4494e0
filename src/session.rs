//! Registration, login, token refresh and logout.
//!
//! The only session state is the single refresh token stored on each user
//! row. Logging in replaces it; refreshing swaps it for a new one; logging
//! out clears it. Access tokens are never stored.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{error, info, warn};

use crate::db::{CreateUserError, Database, PublicUser};
use crate::jwt::JwtConfig;
use crate::password::PasswordHasher;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 6;
/// bcrypt ignores everything past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid username regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Internal(String),
}

impl SessionError {
    /// Log the underlying cause and keep only the context for the client.
    fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal(context.to_string())
    }
}

/// Tokens handed out by a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Tokens handed out by a successful refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: PasswordHasher,
}

impl SessionManager {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, hasher: PasswordHasher) -> Self {
        Self { db, jwt, hasher }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Create an account. The password is stored only as a bcrypt hash.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, SessionError> {
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        let users = self.db.users();

        // Early answer only; the UNIQUE constraints on insert are authoritative.
        if users
            .get_by_username(username)
            .await
            .map_err(|e| SessionError::internal("Failed to check username", e))?
            .is_some()
        {
            return Err(SessionError::Conflict("Username already taken".into()));
        }
        if users
            .get_by_email(email)
            .await
            .map_err(|e| SessionError::internal("Failed to check email", e))?
            .is_some()
        {
            return Err(SessionError::Conflict("Email already registered".into()));
        }

        let password_hash = self
            .hasher
            .hash(password)
            .await
            .map_err(|e| SessionError::internal("Failed to process password", e))?;

        let id = match users.create(username, email, &password_hash).await {
            Ok(id) => id,
            Err(e @ (CreateUserError::UsernameTaken | CreateUserError::EmailTaken)) => {
                return Err(SessionError::Conflict(e.to_string()));
            }
            Err(CreateUserError::Database(e)) => {
                return Err(SessionError::internal("Failed to create user", e));
            }
        };

        info!(user_id = id, username = %username, "User registered");

        Ok(PublicUser {
            id,
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    /// Check credentials and start a new session, replacing any previous one.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        if email.is_empty() || password.is_empty() {
            return Err(SessionError::Validation("Invalid request data".into()));
        }
        validate_email(email)?;
        // Longer input would be truncated by bcrypt and match a 72 byte password.
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(SessionError::Validation(
                "Password must be at most 72 bytes long".into(),
            ));
        }

        let user = self
            .db
            .users()
            .get_by_email(email)
            .await
            .map_err(|e| SessionError::internal("Failed to look up user", e))?;

        let Some(user) = user else {
            self.hasher.verify_dummy(password).await;
            warn!("Login failed: unknown email");
            return Err(SessionError::Unauthorized(INVALID_CREDENTIALS));
        };

        let valid = self
            .hasher
            .verify(password, &user.password_hash)
            .await
            .map_err(|e| SessionError::internal("Failed to verify password", e))?;

        if !valid {
            warn!(username = %user.username, "Login failed: wrong password");
            return Err(SessionError::Unauthorized(INVALID_CREDENTIALS));
        }

        let access = self
            .jwt
            .issue_access(&user.username)
            .map_err(|e| SessionError::internal("Failed to generate access token", e))?;
        let refresh = self
            .jwt
            .issue_refresh(&user.username)
            .map_err(|e| SessionError::internal("Failed to generate refresh token", e))?;

        self.db
            .users()
            .set_refresh_token(&user.username, &refresh.token, refresh.expires_at)
            .await
            .map_err(|e| SessionError::internal("Failed to save refresh token", e))?;

        info!(username = %user.username, "User logged in");

        Ok(LoginOutcome {
            access_token: access.token,
            refresh_token: refresh.token,
            user: user.public(),
        })
    }

    /// Exchange a live refresh token for a new pair. The used token stops
    /// working once the new one is stored.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let subject = self.jwt.validate_refresh(refresh_token).map_err(|e| {
            warn!(error = %e, "Refresh rejected: token failed validation");
            SessionError::Unauthorized(INVALID_REFRESH_TOKEN)
        })?;

        let now = self.jwt.now();
        let users = self.db.users();

        let user = users
            .get_by_refresh_token(refresh_token, now)
            .await
            .map_err(|e| SessionError::internal("Failed to look up refresh token", e))?
            .filter(|user| user.username == subject)
            .ok_or_else(|| {
                warn!(username = %subject, "Refresh rejected: token not current");
                SessionError::Unauthorized(INVALID_REFRESH_TOKEN)
            })?;

        let access = self
            .jwt
            .issue_access(&user.username)
            .map_err(|e| SessionError::internal("Failed to generate new access token", e))?;
        let refresh = self
            .jwt
            .issue_refresh(&user.username)
            .map_err(|e| SessionError::internal("Failed to generate new refresh token", e))?;

        let rotated = users
            .rotate_refresh_token(
                &user.username,
                refresh_token,
                &refresh.token,
                refresh.expires_at,
                now,
            )
            .await
            .map_err(|e| SessionError::internal("Failed to update refresh token", e))?;

        if !rotated {
            warn!(username = %user.username, "Refresh rejected: token rotated concurrently");
            return Err(SessionError::Unauthorized(INVALID_REFRESH_TOKEN));
        }

        info!(username = %user.username, "Tokens refreshed");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// End the user's session. Access tokens already issued keep working
    /// until they expire.
    pub async fn logout(&self, username: &str) -> Result<(), SessionError> {
        let cleared = self
            .db
            .users()
            .clear_refresh_token(username)
            .await
            .map_err(|e| SessionError::internal("Failed to logout", e))?;

        if cleared {
            info!(username = %username, "User logged out");
        } else {
            warn!(username = %username, "Logout for unknown user");
        }

        Ok(())
    }
}

pub fn validate_username(username: &str) -> Result<(), SessionError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(SessionError::Validation(
            "Username must be at least 3 characters long".into(),
        ));
    }
    if len > MAX_USERNAME_LEN {
        return Err(SessionError::Validation(
            "Username must be at most 100 characters long".into(),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(SessionError::Validation(
            "Username must contain only Latin letters, numbers, underscores, and hyphens".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), SessionError> {
    if email.chars().count() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return Err(SessionError::Validation("Invalid email format".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SessionError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(SessionError::Validation(
            "Password must be at most 72 bytes long".into(),
        ));
    }
    Ok(())
}
