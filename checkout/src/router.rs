//! HTTP router for the checkout saga service.

use crate::handlers;
use crate::reducer::{CheckoutEnvironment, CheckoutReducer};
use crate::types::{CheckoutAction, CheckoutSessionsState};
use axum::{
    routing::{post, put},
    Router,
};
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the checkout service's router.
///
/// Every route here is reached through the gateway, scoped by the caller's
/// identity: a session is only visible to and actionable by the user who
/// started it (or an admin).
pub fn checkout_router(
    store: Arc<Store<CheckoutSessionsState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>>,
) -> Router {
    Router::new()
        .route("/checkout", post(handlers::initiate_checkout))
        .route("/checkout/:id", axum::routing::get(handlers::get_session))
        .route("/checkout/:id/shipping", put(handlers::attach_shipping))
        .route("/checkout/:id/payment", put(handlers::attach_payment))
        .route("/checkout/:id/process", post(handlers::process))
        .route("/checkout/:id/cancel", post(handlers::cancel))
        .route("/internal/checkout/:id/payment-webhook", post(handlers::payment_webhook))
        .with_state(store)
}
