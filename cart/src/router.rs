//! HTTP router for the cart service.

use crate::handlers;
use crate::store::RedisCartStore;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;

/// Builds the cart service's router. Routes under `/cart` require an
/// authenticated `CurrentUser` and always act on the caller's own cart.
/// `/internal/carts/:user_id` is called service-to-service, not gated by
/// `CurrentUser`.
pub fn cart_router(store: Arc<RedisCartStore>) -> Router {
    Router::new()
        .route("/cart", get(handlers::get_cart).delete(handlers::clear_cart))
        .route("/cart/items", post(handlers::add_item))
        .route("/cart/items/:line_id", put(handlers::update_item).delete(handlers::remove_item))
        .route("/internal/carts/:user_id", delete(handlers::internal_clear_cart))
        .with_state(store)
}
