//! Checkout saga HTTP API server.
//!
//! All routes are reached through the gateway, scoped by the caller's
//! identity. The saga calls the inventory, campaign, payment, order, and
//! cart services directly over HTTP — it has no database of its own.
//!
//! Run with an in-memory event bus and default (unreachable) service URLs,
//! useful only for exercising the state machine:
//! ```bash
//! cargo run --bin checkout-service
//! ```
//!
//! Run against Redpanda and the real services:
//! ```bash
//! KAFKA_BROKERS=localhost:9092 \
//! INVENTORY_SERVICE_URL=http://inventory:3001/api/v1 \
//! CAMPAIGN_SERVICE_URL=http://campaign:3002/api/v1 \
//! ORDER_SERVICE_URL=http://order:3003/api/v1 \
//! PAYMENT_SERVICE_URL=http://payment:3004/api/v1 \
//! CART_SERVICE_URL=http://cart:3005/api/v1 \
//!   cargo run --bin checkout-service
//! ```

use axum::Router;
use composable_rust_core::environment::{Clock, SystemClock};
use composable_rust_core::event_bus::EventBus;
use composable_rust_runtime::Store;
use composable_rust_testing::mocks::InMemoryEventBus;
use composable_rust_web::handlers::health::health_check;
use composable_rust_web::middleware::correlation_id_layer;
use ecommerce_checkout::reducer::CheckoutEnvironment;
use ecommerce_checkout::router::checkout_router;
use ecommerce_checkout::{CheckoutReducer, CheckoutSessionsState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn service_url(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let event_bus: Arc<dyn EventBus> = match std::env::var("KAFKA_BROKERS") {
        Ok(brokers) => {
            info!("using Redpanda event bus ({brokers})");
            Arc::new(composable_rust_redpanda::RedpandaEventBus::new(&brokers)?)
        },
        Err(_) => {
            info!("KAFKA_BROKERS not set, using in-memory event bus");
            Arc::new(InMemoryEventBus::new())
        },
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let http = reqwest::Client::new();

    let environment = CheckoutEnvironment::new(
        http,
        clock,
        event_bus,
        service_url("INVENTORY_SERVICE_URL", "http://localhost:3001/api/v1"),
        service_url("CAMPAIGN_SERVICE_URL", "http://localhost:3002/api/v1"),
        service_url("PAYMENT_SERVICE_URL", "http://localhost:3004/api/v1"),
        service_url("ORDER_SERVICE_URL", "http://localhost:3003/api/v1"),
        service_url("CART_SERVICE_URL", "http://localhost:3005/api/v1"),
    );

    let store = Arc::new(Store::new(CheckoutSessionsState::new(), CheckoutReducer::new(), environment));

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", checkout_router(store))
        .layer(correlation_id_layer());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3006".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("checkout service listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
