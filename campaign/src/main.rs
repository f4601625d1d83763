//! Campaign service HTTP API server.
//!
//! `GET /campaigns` and `GET /campaigns/:id` are public, reached through the
//! gateway. Lifecycle routes require an authenticated admin.
//! `POST /internal/discounts/apply` is service-to-service only, called by
//! checkout's own saga.
//!
//! Run with an in-memory event store and bus:
//! ```bash
//! cargo run --bin campaign-service
//! ```

use axum::Router;
use composable_rust_core::environment::{Clock, SystemClock};
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_runtime::Store;
use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};
use composable_rust_web::handlers::health::health_check;
use composable_rust_web::middleware::correlation_id_layer;
use ecommerce_campaign::reducer::{CampaignEnvironment, CampaignReducer};
use ecommerce_campaign::router::campaign_router;
use ecommerce_campaign::types::CampaignsState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let event_store: Arc<dyn EventStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            info!("using PostgreSQL event store");
            let store = composable_rust_postgres::PostgresEventStore::new(&database_url).await?;
            store.migrate().await?;
            Arc::new(store)
        },
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory event store");
            Arc::new(InMemoryEventStore::new())
        },
    };

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
    let environment = CampaignEnvironment::new(event_store, event_bus, clock);
    let store = Arc::new(Store::new(CampaignsState::new(), CampaignReducer::new(), environment));

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", campaign_router(store))
        .layer(correlation_id_layer());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3002".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("campaign service listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
