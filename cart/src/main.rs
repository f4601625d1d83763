//! Cart service HTTP API server.
//!
//! Every route requires an authenticated caller except
//! `/internal/carts/:user_id`, used by checkout's saga to clear a cart
//! after a purchase completes.
//!
//! ```bash
//! REDIS_URL=redis://127.0.0.1:6379 cargo run --bin cart-service
//! ```

use axum::Router;
use composable_rust_web::handlers::health::health_check;
use composable_rust_web::middleware::correlation_id_layer;
use ecommerce_cart::router::cart_router;
use ecommerce_cart::RedisCartStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = Arc::new(RedisCartStore::new(&redis_url).await?);
    info!("connected to Redis at {redis_url}");

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", cart_router(store))
        .layer(correlation_id_layer());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3005".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("cart service listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
