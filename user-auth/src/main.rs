//! User/auth service HTTP API server.
//!
//! `POST /auth/register`, `/auth/login`, and `/auth/refresh` are public,
//! reached through the gateway without a bearer token. `/users/*` routes
//! require an authenticated `CurrentUser`.
//!
//! Requires `DATABASE_URL`: unlike the catalog services this crate has no
//! in-memory fallback, since user accounts are relational state with no
//! meaningful ephemeral mode.
//!
//! ```bash
//! DATABASE_URL=postgres://... JWT_SECRET=... cargo run --bin user-auth-service
//! ```

use axum::Router;
use composable_rust_web::handlers::health::health_check;
use composable_rust_web::middleware::correlation_id_layer;
use ecommerce_user_auth::handlers::AppState;
use ecommerce_user_auth::router::user_auth_router;
use ecommerce_user_auth::store::PostgresUserStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

fn load_jwt_secret() -> String {
    let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

    if app_env != "development" && secret == DEFAULT_JWT_SECRET {
        panic!("JWT_SECRET must be set to a non-default value when APP_ENV={app_env}");
    }

    secret
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL")?;
    let store = PostgresUserStore::new(&database_url).await?;
    store.migrate().await?;
    info!("connected to PostgreSQL, migrations applied");

    let jwt_secret = load_jwt_secret();
    let state = Arc::new(AppState { store, jwt_secret });

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", user_auth_router(state))
        .layer(correlation_id_layer());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8006".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("user-auth service listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
