//! HTTP router for the product catalog service.

use crate::handlers;
use crate::reducer::{ProductEnvironment, ProductReducer};
use crate::types::{ProductAction, ProductsState};
use axum::routing::{get, post, put};
use axum::Router;
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the product service's router. `GET` routes are public, reached
/// through the gateway without authentication; every mutating route
/// requires an admin `CurrentUser`.
pub fn product_router(store: Arc<Store<ProductsState, ProductAction, ProductEnvironment, ProductReducer>>) -> Router {
    Router::new()
        .route("/products", get(handlers::list_products).post(handlers::create_product))
        .route("/products/:id", get(handlers::get_product))
        .route("/products/:id/publish", post(handlers::publish_product))
        .route("/products/:id/archive", post(handlers::archive_product))
        .route("/products/:id/variants", put(handlers::set_variant))
        .route("/products/:id/images", post(handlers::add_image))
        .with_state(store)
}
