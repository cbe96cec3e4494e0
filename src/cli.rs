//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::password::{DEFAULT_BCRYPT_COST, MIN_BCRYPT_COST, PasswordHasher};
use clap::Parser;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const MIN_JWT_SECRET_LENGTH: usize = 32;

const INITIAL_CONNECT_DELAY: Duration = Duration::from_millis(500);
const MAX_CONNECT_DELAY: Duration = Duration::from_secs(10);

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "microblog", about = "Multi-user blog backend")]
pub struct Args {
    /// Base path prefix for the API routes (e.g. "/api")
    #[arg(short, long, value_parser = validate_base_path)]
    pub base: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, env = "MICROBLOG_DATABASE", default_value = "microblog.db")]
    pub database: String,

    /// How many times to try opening the database before giving up
    #[arg(long, default_value = "10")]
    pub db_connect_attempts: u32,

    /// Path to file containing the access token secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer using JWT_REFRESH_SECRET env var instead
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// bcrypt cost factor for password hashing
    #[arg(long, default_value_t = DEFAULT_BCRYPT_COST,
        value_parser = clap::value_parser!(u32).range((MIN_BCRYPT_COST as i64)..=31))]
    pub bcrypt_cost: u32,

    /// Login and register attempts allowed per client IP per minute (unlimited if unset)
    #[arg(long)]
    pub login_rate_limit: Option<NonZeroU32>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load one secret from `env_var` or, failing that, from `file`.
/// The environment variable is removed once read.
fn load_secret(env_var: &str, file: Option<&str>, flag: &str) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the {} environment variable (recommended) or use {}",
            env_var, env_var, flag
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the access and refresh token secrets.
/// Returns None and logs an error if either is missing, too short, or both are equal.
pub fn load_jwt_secrets(
    jwt_secret_file: Option<&str>,
    jwt_refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret("JWT_SECRET", jwt_secret_file, "--jwt-secret-file")?;
    let refresh = load_secret(
        "JWT_REFRESH_SECRET",
        jwt_refresh_secret_file,
        "--jwt-refresh-secret-file",
    )?;

    if access == refresh {
        error!("JWT_SECRET and JWT_REFRESH_SECRET must be different");
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the signing keys or hasher cannot be set up.
pub fn build_config(
    base: Option<String>,
    db: Database,
    secrets: (String, String),
    bcrypt_cost: u32,
    login_rate_limit: Option<NonZeroU32>,
) -> Option<ServerConfig> {
    let (access, refresh) = secrets;

    let jwt = match JwtConfig::new(access.as_bytes(), refresh.as_bytes()) {
        Ok(jwt) => jwt,
        Err(e) => {
            error!(error = %e, "Invalid JWT configuration");
            return None;
        }
    };

    let hasher = match PasswordHasher::new(bcrypt_cost) {
        Ok(hasher) => hasher,
        Err(e) => {
            error!(error = %e, "Failed to initialize password hasher");
            return None;
        }
    };

    Some(ServerConfig {
        base,
        db,
        jwt: Arc::new(jwt),
        hasher,
        login_rate_limit,
    })
}

/// Open the database, retrying with exponential backoff.
/// Returns None and logs an error once every attempt has failed.
pub async fn open_database(path: &str, attempts: u32) -> Option<Database> {
    let attempts = attempts.max(1);
    let mut delay = INITIAL_CONNECT_DELAY;

    for attempt in 1..=attempts {
        match Database::open(path).await {
            Ok(db) => {
                info!(path = %path, "Database opened");
                return Some(db);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    path = %path,
                    error = %e,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to open database, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_CONNECT_DELAY);
            }
            Err(e) => {
                error!(path = %path, error = %e, attempts, "Failed to open database");
            }
        }
    }

    None
}
