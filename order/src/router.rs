//! HTTP router for the order service.

use crate::handlers;
use crate::reducer::{OrderEnvironment, OrderReducer};
use crate::types::{OrderAction, OrdersState};
use axum::{
    routing::{get, post},
    Router,
};
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the order service's router.
///
/// `GET /orders` and `GET /orders/:id` sit behind the gateway, scoped by the
/// caller's identity. The remaining routes (`POST /orders`,
/// `POST /orders/:id/status`, `POST /orders/:id/cancel`,
/// `POST /orders/:id/pay`) are this service's internal surface: called
/// directly by the checkout saga and the payment service's settlement
/// callback, never forwarded by the gateway.
pub fn order_router(store: Arc<Store<OrdersState, OrderAction, OrderEnvironment, OrderReducer>>) -> Router {
    Router::new()
        .route("/orders", get(handlers::list_orders).post(handlers::create_order))
        .route("/orders/:id", get(handlers::get_order))
        .route("/orders/:id/status", post(handlers::update_status))
        .route("/orders/:id/cancel", post(handlers::cancel_order))
        .route("/orders/:id/pay", post(handlers::mark_paid))
        .with_state(store)
}
