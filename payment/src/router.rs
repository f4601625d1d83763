//! HTTP router for the payment service.

use crate::handlers;
use crate::reducer::{PaymentEnvironment, PaymentReducer};
use crate::types::{PaymentAction, PaymentsState};
use axum::routing::post;
use axum::Router;
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the payment service's router. Every route is internal: reached
/// directly by the checkout saga or a provider's webhook, never by the
/// gateway.
pub fn payment_router(store: Arc<Store<PaymentsState, PaymentAction, PaymentEnvironment, PaymentReducer>>) -> Router {
    Router::new()
        .route("/internal/payments", post(handlers::initiate))
        .route("/internal/payments/:id/refund", post(handlers::refund))
        .route("/internal/payments/:id/cancel", post(handlers::cancel))
        .route("/internal/payments/:id/webhook", post(handlers::settle_webhook))
        .with_state(store)
}
