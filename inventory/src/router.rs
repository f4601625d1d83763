//! HTTP router for the inventory service.

use crate::handlers;
use crate::reducer::{InventoryEnvironment, InventoryReducer};
use crate::types::{InventoryAction, InventoryState};
use axum::{
    routing::{get, post},
    Router,
};
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the inventory service's router.
///
/// `GET /inventory/stock/:product_id` and `POST /inventory/availability`
/// sit behind the gateway as public reads. `POST /internal/reservations`
/// and `POST /internal/reservations/:checkout_id/release` are this
/// service's internal surface, called directly by the checkout saga and
/// never forwarded by the gateway.
pub fn inventory_router(store: Arc<Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>>) -> Router {
    Router::new()
        .route("/inventory/stock/:product_id", get(handlers::get_stock))
        .route("/inventory/availability", post(handlers::check_availability))
        .route("/internal/reservations", post(handlers::reserve))
        .route("/internal/reservations/:checkout_id/release", post(handlers::release))
        .with_state(store)
}
