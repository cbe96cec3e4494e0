//! Password hashing with bcrypt.
//!
//! Hashing is CPU-bound, so every call runs on the blocking thread pool.

use std::sync::Arc;

/// Default bcrypt cost, roughly 200ms per hash on current hardware.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Lowest cost bcrypt accepts. Only suitable for tests.
pub const MIN_BCRYPT_COST: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hashes and verifies passwords at a fixed bcrypt cost.
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Hash of a throwaway password, verified against when a login names an
    /// unknown account so both failure paths take the same time.
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        let dummy_hash = bcrypt::hash(uuid::Uuid::new_v4().to_string(), cost)?;
        Ok(Self {
            cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash a plaintext password with a fresh random salt.
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_owned();
        let cost = self.cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hash)
    }

    /// Check a plaintext password against a stored hash.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
        Ok(valid)
    }

    /// Spend the same time as a real verification and report failure.
    pub async fn verify_dummy(&self, password: &str) -> bool {
        let dummy = self.dummy_hash.clone();
        let _ = self.verify(password, &dummy).await;
        false
    }
}
