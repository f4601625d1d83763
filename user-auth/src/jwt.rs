//! Access-token issuance. Tokens are verified exclusively by the gateway
//! (`composable_rust_web::extractors::CurrentUser` trusts whatever identity
//! headers the gateway already attached), so this module only ever encodes.

use crate::error::AuthError;
use crate::types::{User, UserId};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Default access-token lifetime.
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);

/// Claims minted into every access token. Shape matches the gateway's own
/// `Claims` struct exactly: `sub` and `user_id` carry the same value,
/// `role` is the lowercase string form the gateway forwards verbatim as
/// `X-User-Role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    user_id: String,
    email: String,
    role: String,
    exp: u64,
}

/// Encodes a signed access token for `user`, valid for `ACCESS_TOKEN_TTL`.
///
/// # Errors
///
/// Returns `AuthError::Token` if signing fails.
pub fn issue_access_token(user: &User, secret: &str) -> Result<String, AuthError> {
    let expires_at = Utc::now() + ACCESS_TOKEN_TTL;
    let claims = Claims {
        sub: user.user_id.0.to_string(),
        user_id: user.user_id.0.to_string(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        exp: u64::try_from(expires_at.timestamp()).unwrap_or(0),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(AuthError::from)
}

/// Parses a user id out of a bearer subject string, as recorded by
/// `issue_access_token`. Exposed for callers that already hold a verified
/// subject (e.g. tests) and need the typed id back.
#[must_use]
pub fn parse_subject(subject: &str) -> Option<UserId> {
    subject.parse().ok().map(UserId)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::UserRole;
    use chrono::Utc;

    fn user() -> User {
        User {
            user_id: UserId::generate(),
            email: "jess@example.com".to_string(),
            name: "Jess".to_string(),
            role: UserRole::Customer,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_decodes_with_the_same_secret() {
        let user = user();
        let token = issue_access_token(&user, "test-secret").expect("should issue");

        let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        let decoded = jsonwebtoken::decode::<Claims>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .expect("should decode");

        assert_eq!(decoded.claims.sub, user.user_id.0.to_string());
        assert_eq!(decoded.claims.role, "customer");
    }
}
