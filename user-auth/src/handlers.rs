//! HTTP handlers for the user/auth service.
//!
//! `POST /auth/register`, `/auth/login`, and `/auth/refresh` are public,
//! reached through the gateway without a bearer token. Every other route
//! requires an authenticated `CurrentUser`, injected by the gateway after
//! it verifies the access token this service minted.

use crate::error::AuthError;
use crate::jwt::{self, ACCESS_TOKEN_TTL};
use crate::password;
use crate::refresh::{self, REFRESH_TOKEN_TTL};
use crate::store::PostgresUserStore;
use crate::types::{Address, TokenPair, User, UserId};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use composable_rust_web::extractors::CurrentUser;
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handler state: the repository plus the secret used to sign and
/// (downstream, at the gateway) verify access tokens.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for users, refresh tokens, and addresses.
    pub store: PostgresUserStore,
    /// HMAC secret access tokens are signed with.
    pub jwt_secret: String,
}

type SharedState = Arc<AppState>;

fn to_token_pair(state: &AppState, user: &User) -> Result<(TokenPair, String), AppError> {
    let access_token = jwt::issue_access_token(user, &state.jwt_secret).map_err(AppError::from)?;
    let issued = refresh::issue();
    let pair = TokenPair {
        access_token,
        refresh_token: issued.plaintext,
        expires_in: ACCESS_TOKEN_TTL.num_seconds(),
    };
    Ok((pair, issued.hash))
}

/// A user as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    /// User identifier.
    pub user_id: String,
    /// Account email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role, lowercased.
    pub role: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.0.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.as_str().to_string(),
        }
    }
}

/// An address as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct AddressResponse {
    /// Address identifier.
    pub address_id: String,
    /// Free-text label.
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

impl From<&Address> for AddressResponse {
    fn from(address: &Address) -> Self {
        Self {
            address_id: address.address_id.to_string(),
            label: address.label.clone(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            is_default: address.is_default,
        }
    }
}

/// Response body for register/login/refresh.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    /// Newly issued token pair.
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// The authenticated user.
    pub user: UserResponse,
}

/// Request body for `POST /auth/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Account email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Plaintext password, checked against the complexity policy before
    /// being bcrypt-hashed.
    pub password: String,
}

/// Registers a new account, hashes its password, and issues a token pair.
///
/// # Endpoint
///
/// `POST /auth/register`
pub async fn register(
    State(state): State<SharedState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    password::validate_policy(&request.password).map_err(AppError::from)?;
    let password_hash = password::hash(&request.password).map_err(AppError::from)?;

    let user = state.store.create_user(&request.email, &request.name, &password_hash).await.map_err(AppError::from)?;

    let (tokens, refresh_hash) = to_token_pair(&state, &user)?;
    state
        .store
        .store_refresh_token(user.user_id, &refresh_hash, Utc::now() + REFRESH_TOKEN_TTL)
        .await
        .map_err(AppError::from)?;

    Ok(Json(AuthResponse { tokens, user: UserResponse::from(&user) }))
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Verifies credentials and issues a fresh token pair.
///
/// # Endpoint
///
/// `POST /auth/login`
pub async fn login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, password_hash) =
        state.store.get_user_with_password_by_email(&request.email).await.map_err(AppError::from)?;

    let matches = password::verify(&request.password, &password_hash).map_err(AppError::from)?;
    if !matches {
        return Err(AuthError::InvalidCredentials.into());
    }

    let (tokens, refresh_hash) = to_token_pair(&state, &user)?;
    state
        .store
        .store_refresh_token(user.user_id, &refresh_hash, Utc::now() + REFRESH_TOKEN_TTL)
        .await
        .map_err(AppError::from)?;

    Ok(Json(AuthResponse { tokens, user: UserResponse::from(&user) }))
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token presented by the caller.
    pub refresh_token: String,
}

/// Rotates a refresh token: the presented token is revoked and a new pair
/// is issued, so a token can only ever be exchanged once.
///
/// # Endpoint
///
/// `POST /auth/refresh`
pub async fn refresh(
    State(state): State<SharedState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let presented_hash = refresh::hash_token(&request.refresh_token);
    let user_id = state.store.consume_refresh_token(&presented_hash).await.map_err(AppError::from)?;
    let user = state.store.get_user_by_id(user_id).await.map_err(AppError::from)?;

    let (tokens, refresh_hash) = to_token_pair(&state, &user)?;
    state
        .store
        .store_refresh_token(user.user_id, &refresh_hash, Utc::now() + REFRESH_TOKEN_TTL)
        .await
        .map_err(AppError::from)?;

    Ok(Json(AuthResponse { tokens, user: UserResponse::from(&user) }))
}

/// Request body for `POST /auth/logout`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    /// Refresh token to revoke.
    pub refresh_token: String,
}

/// Revokes a refresh token. Best-effort and idempotent: logging out twice,
/// or with an already-expired token, still returns success.
///
/// # Endpoint
///
/// `POST /auth/logout`
pub async fn logout(
    State(state): State<SharedState>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let presented_hash = refresh::hash_token(&request.refresh_token);
    state.store.revoke_refresh_token(&presented_hash).await.map_err(AppError::from)?;
    Ok(Json(serde_json::json!({ "logged_out": true })))
}

/// Fetches the caller's own profile.
///
/// # Endpoint
///
/// `GET /users/me`
pub async fn get_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_current_user_id(&user)?;
    let account = state.store.get_user_by_id(user_id).await.map_err(AppError::from)?;
    Ok(Json(UserResponse::from(&account)))
}

/// Request body for `PUT /users/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    /// New display name.
    pub name: String,
}

/// Updates the caller's own display name.
///
/// # Endpoint
///
/// `PUT /users/me`
pub async fn update_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_current_user_id(&user)?;
    let account = state.store.update_name(user_id, &request.name).await.map_err(AppError::from)?;
    Ok(Json(UserResponse::from(&account)))
}

/// Lists the caller's own addresses.
///
/// # Endpoint
///
/// `GET /users/me/addresses`
pub async fn list_addresses(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<Vec<AddressResponse>>, AppError> {
    let user_id = parse_current_user_id(&user)?;
    let addresses = state.store.list_addresses(user_id).await.map_err(AppError::from)?;
    Ok(Json(addresses.iter().map(AddressResponse::from).collect()))
}

/// Request body for `POST /users/me/addresses`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAddressRequest {
    /// Free-text label.
    pub label: String,
    /// First line of the street address.
    pub line1: String,
    /// Second line of the street address, if any.
    #[serde(default)]
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or province.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// ISO-3166 country code.
    pub country: String,
    /// Whether this becomes the user's default address.
    #[serde(default)]
    pub is_default: bool,
}

/// Adds an address to the caller's own account.
///
/// # Endpoint
///
/// `POST /users/me/addresses`
pub async fn create_address(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(request): Json<CreateAddressRequest>,
) -> Result<Json<AddressResponse>, AppError> {
    let user_id = parse_current_user_id(&user)?;
    let address = state
        .store
        .create_address(
            user_id,
            &request.label,
            &request.line1,
            request.line2.as_deref(),
            &request.city,
            &request.state,
            &request.postal_code,
            &request.country,
            request.is_default,
        )
        .await
        .map_err(AppError::from)?;
    Ok(Json(AddressResponse::from(&address)))
}

/// Deletes one of the caller's own addresses.
///
/// # Endpoint
///
/// `DELETE /users/me/addresses/:id`
pub async fn delete_address(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(address_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = parse_current_user_id(&user)?;
    state.store.delete_address(user_id, address_id).await.map_err(AppError::from)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

fn parse_current_user_id(user: &CurrentUser) -> Result<UserId, AppError> {
    let parsed: Uuid = user.user_id.parse().map_err(|_| AppError::unauthorized("malformed user id"))?;
    Ok(UserId(parsed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_subject() {
        let user = CurrentUser { user_id: Uuid::new_v4().to_string(), email: None, role: composable_rust_web::extractors::Role::Customer };
        assert!(parse_current_user_id(&user).is_ok());
    }

    #[test]
    fn rejects_a_malformed_subject() {
        let user = CurrentUser { user_id: "not-a-uuid".to_string(), email: None, role: composable_rust_web::extractors::Role::Customer };
        assert!(parse_current_user_id(&user).is_err());
    }
}
