//! API gateway server.
//!
//! Run with defaults (every backend assumed on localhost at its documented
//! port):
//! ```bash
//! cargo run --bin gateway
//! ```
//!
//! Point at deployed backends and a real JWT secret:
//! ```bash
//! JWT_SECRET=... \
//! PRODUCT_SERVICE_URL=http://product:8001 \
//! CART_SERVICE_URL=http://cart:8002 \
//! ORDER_SERVICE_URL=http://order:8003 \
//! CHECKOUT_SERVICE_URL=http://checkout:8004 \
//! PAYMENT_SERVICE_URL=http://payment:8005 \
//! USER_SERVICE_URL=http://user:8006 \
//! INVENTORY_SERVICE_URL=http://inventory:8007 \
//! CAMPAIGN_SERVICE_URL=http://campaign:8008 \
//!   cargo run --bin gateway
//! ```

use ecommerce_gateway::{build_router, GatewayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env();
    let addr = config.listen_addr.clone();
    let app = build_router(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
