//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate keys, so one kind can
//! never be replayed as the other. Both carry the username as `sub`.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token (15 minutes), never stored
    Access,
    /// Long-lived refresh token (7 days), stored on the user row
    Refresh,
}

/// JWT claims shared by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID, keeps two tokens issued in the same second distinct
    pub jti: String,
    /// Subject (username)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations. Immutable once built.
pub struct JwtConfig {
    access: SigningKeys,
    refresh: SigningKeys,
    clock: Arc<dyn Clock>,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

impl JwtConfig {
    /// Create a JWT configuration using the system clock.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, JwtError> {
        Self::with_clock(access_secret, refresh_secret, Arc::new(SystemClock))
    }

    /// Create a JWT configuration reading time from `clock`.
    pub fn with_clock(
        access_secret: &[u8],
        refresh_secret: &[u8],
        clock: Arc<dyn Clock>,
    ) -> Result<Self, JwtError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(JwtError::MissingKey);
        }
        if access_secret == refresh_secret {
            return Err(JwtError::SharedKey);
        }

        Ok(Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            clock,
        })
    }

    /// Current time according to the configured clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Issue an access token for `subject`.
    pub fn issue_access(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(
            subject,
            TokenType::Access,
            ACCESS_TOKEN_DURATION_SECS,
            &self.access,
        )
    }

    /// Issue a refresh token for `subject`.
    pub fn issue_refresh(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(
            subject,
            TokenType::Refresh,
            REFRESH_TOKEN_DURATION_SECS,
            &self.refresh,
        )
    }

    /// Validate an access token and return its subject.
    pub fn validate_access(&self, token: &str) -> Result<String, JwtError> {
        self.decode(token, TokenType::Access, &self.access)
            .map(|claims| claims.sub)
    }

    /// Validate a refresh token and return its subject.
    pub fn validate_refresh(&self, token: &str) -> Result<String, JwtError> {
        self.decode(token, TokenType::Refresh, &self.refresh)
            .map(|claims| claims.sub)
    }

    fn issue(
        &self,
        subject: &str,
        token_type: TokenType,
        duration: u64,
        keys: &SigningKeys,
    ) -> Result<IssuedToken, JwtError> {
        let now = self.now();
        let exp = now + duration;

        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            token_type,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(JwtError::Signing)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    fn decode(
        &self,
        token: &str,
        expected: TokenType,
        keys: &SigningKeys,
    ) -> Result<Claims, JwtError> {
        // Expiry is checked against our own clock below.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(JwtError::InvalidToken)?;
        let claims = token_data.claims;

        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        if claims.exp <= self.now() {
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// A signing key was empty
    #[error("Signing key is not set")]
    MissingKey,
    /// Access and refresh keys were identical
    #[error("Access and refresh signing keys must differ")]
    SharedKey,
    /// Error encoding the token
    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    /// Bad signature, algorithm or structure
    #[error("Invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    /// Token is past its `exp`
    #[error("Token expired")]
    Expired,
    /// Wrong token type (e.g., using refresh token as access token)
    #[error("Wrong token type")]
    WrongTokenType,
}
