//! Password policy enforcement and bcrypt hashing.

use crate::error::AuthError;

/// Cost factor for bcrypt. Lower in tests so the suite doesn't pay the
/// production hashing cost on every run.
#[cfg(not(test))]
const BCRYPT_COST: u32 = 10;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

/// Validates a candidate password against the platform's minimum policy:
/// at least 8 characters, one uppercase letter, one lowercase letter, and
/// one digit.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` naming the first unmet rule.
pub fn validate_policy(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword("must be at least 8 characters".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::WeakPassword("must contain an uppercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::WeakPassword("must contain a lowercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword("must contain a digit".to_string()));
    }
    Ok(())
}

/// Hashes a password with bcrypt at the service's configured cost.
///
/// # Errors
///
/// Returns `AuthError::Hash` if bcrypt itself fails.
pub fn hash(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(AuthError::from)
}

/// Verifies a password against a stored bcrypt hash.
///
/// # Errors
///
/// Returns `AuthError::Hash` if the stored hash is malformed.
pub fn verify(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(AuthError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_passwords() {
        assert!(validate_policy("Ab1").is_err());
    }

    #[test]
    fn rejects_missing_digit() {
        assert!(validate_policy("Abcdefgh").is_err());
    }

    #[test]
    fn rejects_missing_uppercase() {
        assert!(validate_policy("abcdefg1").is_err());
    }

    #[test]
    fn accepts_a_compliant_password() {
        assert!(validate_policy("Abcdefg1").is_ok());
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("Abcdefg1").expect("hash should succeed");
        assert!(verify("Abcdefg1", &hashed).expect("verify should succeed"));
        assert!(!verify("wrong-password", &hashed).expect("verify should succeed"));
    }
}
