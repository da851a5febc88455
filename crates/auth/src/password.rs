use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Minimum accepted password length (characters).
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("password does not match")]
    Mismatch,
}

/// Hashes a password using Argon2id with a random salt.
///
/// CPU-bound by design; async callers should run it on a blocking thread.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verifies a password against a stored Argon2 hash.
///
/// The underlying comparison is constant-time.
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|err| {
            tracing::trace!("password verification failed: {err}");
            PasswordError::Mismatch
        })
}

/// Burn the same verification cost as a real login for an unknown username.
///
/// Always returns [`PasswordError::Mismatch`].
pub fn verify_against_dummy(password: &str) -> PasswordError {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| hash_password("terra-dummy-password").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
    PasswordError::Mismatch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_password() {
        let hash = hash_password("test_password_123").expect("hash");

        assert!(verify_password("test_password_123", &hash).is_ok());
        assert_eq!(verify_password("wrong_password", &hash), Err(PasswordError::Mismatch));
    }

    #[test]
    fn hash_generates_different_salts() {
        let hash1 = hash_password("same_password").expect("hash");
        let hash2 = hash_password("same_password").expect("hash");

        assert_ne!(hash1, hash2);
        assert!(verify_password("same_password", &hash1).is_ok());
        assert!(verify_password("same_password", &hash2).is_ok());
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let hash = hash_password("plaintext-secret").expect("hash");
        assert!(!hash.contains("plaintext-secret"));
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn verify_invalid_hash_format() {
        assert!(matches!(
            verify_password("password", "not_a_valid_hash"),
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[test]
    fn dummy_verification_always_mismatches() {
        assert_eq!(verify_against_dummy("terra-dummy-password-no"), PasswordError::Mismatch);
    }
}
