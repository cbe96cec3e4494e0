//! Credential storage: user rows and their refresh-token state.
//!
//! Each user holds at most one refresh token. Storing a new one replaces
//! the previous token, which is then rejected on its next use.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub token_expiry: Option<i64>,
    pub created_at: String,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// User fields safe to send to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// How a user appears on posts and comments, which anyone can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    refresh_token: Option<String>,
    token_expiry: Option<i64>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            refresh_token: row.refresh_token,
            token_expiry: row.token_expiry,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("Username already taken")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user. Returns the user ID.
    /// The UNIQUE constraints decide conflicts, so concurrent registrations
    /// of the same name cannot both succeed.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, CreateUserError> {
        let result =
            sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
                .bind(username)
                .bind(email)
                .bind(password_hash)
                .execute(&self.pool)
                .await;

        match result {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                if e.message().contains("users.email") {
                    Err(CreateUserError::EmailTaken)
                } else {
                    Err(CreateUserError::UsernameTaken)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, password_hash, refresh_token, token_expiry, created_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, password_hash, refresh_token, token_expiry, created_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, password_hash, refresh_token, token_expiry, created_at
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get the user currently holding `token`, if its stored expiry is after `now`.
    pub async fn get_by_refresh_token(
        &self,
        token: &str,
        now: u64,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, password_hash, refresh_token, token_expiry, created_at
             FROM users WHERE refresh_token = ? AND token_expiry > ?",
        )
        .bind(token)
        .bind(now as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Store `token` as the user's only refresh token, replacing any previous one.
    pub async fn set_refresh_token(
        &self,
        username: &str,
        token: &str,
        expiry: u64,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = ?, token_expiry = ? WHERE username = ?")
                .bind(token)
                .bind(expiry as i64)
                .bind(username)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace `old` with `new` only if `old` is still the user's live token.
    /// Returns false when another request already rotated or cleared it.
    pub async fn rotate_refresh_token(
        &self,
        username: &str,
        old: &str,
        new: &str,
        expiry: u64,
        now: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = ?, token_expiry = ?
             WHERE username = ? AND refresh_token = ? AND token_expiry > ?",
        )
        .bind(new)
        .bind(expiry as i64)
        .bind(username)
        .bind(old)
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the user's refresh token (logout).
    pub async fn clear_refresh_token(&self, username: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, token_expiry = NULL WHERE username = ?",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every refresh token whose stored expiry is at or before `now`.
    pub async fn clear_expired_refresh_tokens(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, token_expiry = NULL
             WHERE token_expiry IS NOT NULL AND token_expiry <= ?",
        )
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
