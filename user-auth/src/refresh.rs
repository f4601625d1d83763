//! Opaque refresh tokens: issued as random bytes, stored server-side only
//! as a salted hash. Refresh rotates the token and revokes the previous
//! one, so a stolen token is only ever good for a single exchange.

use chrono::Duration;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Refresh-token lifetime.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(30);

/// Number of random bytes in a minted refresh token (256 bits).
const TOKEN_BYTES: usize = 32;

/// A freshly minted refresh token: the plaintext to hand back to the
/// caller, and the hash to persist.
pub struct IssuedRefreshToken {
    /// Opaque token returned to the caller; never stored.
    pub plaintext: String,
    /// SHA-256 hex digest of `plaintext`, what gets persisted.
    pub hash: String,
}

/// Mints a new refresh token.
#[must_use]
pub fn issue() -> IssuedRefreshToken {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    let hash = hash_token(&plaintext);
    IssuedRefreshToken { plaintext, hash }
}

/// Hashes a presented refresh token the same way `issue` hashes a minted
/// one, so lookups can match by hash without ever storing the plaintext.
#[must_use]
pub fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_are_unique() {
        let a = issue();
        let b = issue();
        assert_ne!(a.plaintext, b.plaintext);
    }

    #[test]
    fn hash_token_is_deterministic_and_matches_issue() {
        let issued = issue();
        assert_eq!(hash_token(&issued.plaintext), issued.hash);
    }
}
