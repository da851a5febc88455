//! Single-use password reset token material.
//!
//! Only the SHA-256 digest of a token is ever persisted; the plaintext exists
//! just long enough to be mailed.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Duration;
use sha2::{Digest, Sha256};

/// How long a reset token stays valid after issuance.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 15;

pub fn reset_token_ttl() -> Duration {
    Duration::minutes(RESET_TOKEN_TTL_MINUTES)
}

const TOKEN_BYTES: usize = 32;

/// Freshly generated token: plaintext for the mail, hash for the store.
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let hash = hash_reset_token(&plaintext);
        Self { plaintext, hash }
    }
}

impl core::fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResetToken")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

/// Lowercase hex SHA-256 of the token as presented by the client.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_high_entropy_hex() {
        let token = ResetToken::generate();
        assert_eq!(token.plaintext.len(), TOKEN_BYTES * 2);
        assert!(token.plaintext.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token.plaintext, ResetToken::generate().plaintext);
    }

    #[test]
    fn stored_hash_matches_presented_token() {
        let token = ResetToken::generate();
        assert_eq!(hash_reset_token(&token.plaintext), token.hash);
        assert_ne!(token.hash, token.plaintext);
    }

    #[test]
    fn debug_output_hides_plaintext() {
        let token = ResetToken::generate();
        assert!(!format!("{token:?}").contains(&token.plaintext));
    }
}
