//! Error taxonomy for the user/auth service.

use composable_rust_web::AppError;
use thiserror::Error;

/// Failure modes for registration, login, token, and profile operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password didn't match a known account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration attempted with an email already on file.
    #[error("email already registered")]
    EmailAlreadyExists,

    /// Password failed the minimum complexity policy.
    #[error("password does not meet complexity requirements: {0}")]
    WeakPassword(String),

    /// No account exists for the given id.
    #[error("user not found")]
    UserNotFound,

    /// No address exists for the given id under this user.
    #[error("address not found")]
    AddressNotFound,

    /// Refresh token doesn't match any live, unrevoked token.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Refresh token matched a record but it has expired or been revoked.
    #[error("refresh token expired or revoked")]
    RefreshTokenRevoked,

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Token signing or encoding failed.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed.
    #[error("password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => Self::unauthorized("invalid credentials"),
            AuthError::EmailAlreadyExists => Self::conflict("email already registered"),
            AuthError::WeakPassword(reason) => Self::bad_request(reason),
            AuthError::UserNotFound => Self::not_found("User", ""),
            AuthError::AddressNotFound => Self::not_found("Address", ""),
            AuthError::InvalidRefreshToken | AuthError::RefreshTokenRevoked => {
                Self::unauthorized("invalid refresh token")
            },
            AuthError::Database(error) => {
                tracing::error!("database error: {error}");
                Self::internal("database error")
            },
            AuthError::Token(error) => {
                tracing::error!("token error: {error}");
                Self::internal("token error")
            },
            AuthError::Hash(error) => {
                tracing::error!("hash error: {error}");
                Self::internal("hash error")
            },
        }
    }
}
