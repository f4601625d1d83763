//! HTTP router for the user/auth service.

use crate::handlers::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Builds the user/auth service's router. `/auth/*` routes are public,
/// reached through the gateway without a bearer token; every `/users/*`
/// route requires an authenticated `CurrentUser`.
pub fn user_auth_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route("/users/me", get(handlers::get_profile).put(handlers::update_profile))
        .route("/users/me/addresses", get(handlers::list_addresses).post(handlers::create_address))
        .route("/users/me/addresses/:id", axum::routing::delete(handlers::delete_address))
        .with_state(state)
}
