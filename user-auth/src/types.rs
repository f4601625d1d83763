//! Core domain types for the user/auth service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a new random `UserId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Role a user holds. Mirrors `composable_rust_web::extractors::Role`, but
/// owned here since this service mints the token that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular storefront customer.
    Customer,
    /// Platform administrator.
    Admin,
}

impl UserRole {
    /// String form used in JWT claims and the `users.role` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// User identifier.
    pub user_id: UserId,
    /// Account email, unique.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role this user holds.
    pub role: UserRole,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last profile update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A shipping/billing address belonging to a user.
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    /// Address identifier.
    pub address_id: Uuid,
    /// Owning user.
    pub user_id: UserId,
    /// Free-text label, e.g. "Home" or "Work".
    pub label: String,
    /// First line of the street address.
    pub line1: String,
    /// Second line of the street address, if any.
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or province.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// ISO-3166 country code.
    pub country: String,
    /// Whether this is the user's default address.
    pub is_default: bool,
}

/// An access/refresh token pair returned from register, login, and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Short-lived JWT, verified by the gateway.
    pub access_token: String,
    /// Long-lived opaque token, presented to `/auth/refresh` to rotate.
    pub refresh_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in: i64,
}
