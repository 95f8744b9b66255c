//! Password hashing with Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Hashing failed
    #[error("failed to hash password: {0}")]
    HashingFailed(String),

    /// Stored hash could not be parsed
    #[error("invalid password hash format: {0}")]
    InvalidHash(String),

    /// The blocking worker running Argon2 did not finish
    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Hash `password` with a fresh random salt, returning the PHC string
///
/// # Errors
///
/// Returns [`PasswordError::HashingFailed`] if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Check `password` against a stored PHC string
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
///
/// # Errors
///
/// Returns [`PasswordError::InvalidHash`] if `hash` is not a PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_password`] on the blocking thread pool
///
/// Argon2 is deliberately slow, so it must not run on an executor thread.
///
/// # Errors
///
/// As [`hash_password`], or [`PasswordError::Worker`] if the task panics.
pub async fn hash_password_blocking(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// [`verify_password`] on the blocking thread pool
///
/// # Errors
///
/// As [`verify_password`], or [`PasswordError::Worker`] if the task panics.
pub async fn verify_password_blocking(
    password: String,
    hash: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_blocking_variants_match() {
        let hash = hash_password_blocking("correct horse".to_owned()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password_blocking("correct horse".to_owned(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking("wrong horse".to_owned(), hash)
            .await
            .unwrap());
        assert!(matches!(
            verify_password_blocking("x".to_owned(), "not-a-hash".to_owned()).await,
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }
}
