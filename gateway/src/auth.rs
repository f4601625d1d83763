//! JWT verification and identity injection.
//!
//! The gateway is the only place a token is ever checked: backends trust
//! `X-User-ID`/`X-User-Email`/`X-User-Role` unconditionally (see
//! `composable_rust_web::extractors::CurrentUser`). Any client-supplied
//! copy of those headers is stripped here before a verified identity (or
//! none, for a public route) is written in its place.

use crate::config::{GatewayConfig, PUBLIC_ROUTES};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use composable_rust_web::error::AppError;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

/// Claims this gateway accepts. `sub` is required by `jsonwebtoken`'s
/// default validation; `user_id` is preferred over `sub` when both are
/// present, matching how this platform's tokens are actually minted.
#[derive(Debug, Clone, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

const IDENTITY_HEADERS: [&str; 3] = ["x-user-id", "x-user-email", "x-user-role"];

/// Returns true if `(method, path)` matches one of the spec's public-route
/// rules, or is a CORS preflight.
#[must_use]
pub fn is_public_route(method: &str, path: &str) -> bool {
    if method.eq_ignore_ascii_case("OPTIONS") {
        return true;
    }
    PUBLIC_ROUTES
        .iter()
        .any(|rule| rule.method.eq_ignore_ascii_case(method) && path.starts_with(rule.prefix))
}

fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in IDENTITY_HEADERS {
        headers.remove(name);
    }
}

fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|error| AppError::unauthorized(format!("invalid token: {error}")))
}

/// Axum middleware enforcing the gateway's auth step: public routes pass
/// through untouched (after stripping any spoofed identity headers);
/// every other route requires a valid `Authorization: Bearer <jwt>`, whose
/// claims are translated into `X-User-*` headers for the backend.
pub async fn require_auth(
    State(config): State<Arc<GatewayConfig>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    strip_identity_headers(request.headers_mut());

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    if is_public_route(&method, &path) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

    let claims = verify(token, &config.jwt_secret)?;
    let user_id = claims.user_id.unwrap_or(claims.sub);

    let headers = request.headers_mut();
    headers.insert("x-user-id", HeaderValue::from_str(&user_id).map_err(|_| AppError::unauthorized("invalid subject"))?);
    if let Some(email) = claims.email {
        if let Ok(value) = HeaderValue::from_str(&email) {
            headers.insert("x-user-email", value);
        }
    }
    if let Some(role) = claims.role {
        if let Ok(value) = HeaderValue::from_str(&role) {
            headers.insert("x-user-role", value);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn get_products_is_public() {
        assert!(is_public_route("GET", "/api/v1/products/widget"));
    }

    #[test]
    fn get_orders_is_not_public() {
        assert!(!is_public_route("GET", "/api/v1/orders/123"));
    }

    #[test]
    fn options_is_always_public() {
        assert!(is_public_route("OPTIONS", "/api/v1/orders"));
    }

    #[test]
    fn post_auth_prefix_is_public() {
        assert!(is_public_route("POST", "/api/v1/auth/login"));
    }

    #[test]
    fn verify_rejects_garbage_tokens() {
        assert!(verify("not-a-jwt", "secret").is_err());
    }
}
