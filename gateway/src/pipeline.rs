//! Assembles the gateway's full middleware pipeline, in the order the spec
//! fixes: panic recovery, correlation id, access log, CORS, rate limit,
//! auth, reverse proxy.

use crate::auth::require_auth;
use crate::config::GatewayConfig;
use crate::proxy::{build_client, proxy};
use crate::rate_limit::{RateLimitLayer, RateLimiter};
use axum::body::Bytes;
use axum::http::{Request, Response, StatusCode};
use axum::middleware;
use axum::routing::any;
use axum::Router;
use composable_rust_web::middleware::correlation_id_layer;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

fn on_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response<axum::body::Body> {
    let message = err
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %message, "request handler panicked");

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(axum::body::Body::from(r#"{"code":"INTERNAL_ERROR","message":"internal server error"}"#))
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}

/// Builds the gateway's router: every path falls through to the reverse
/// proxy, gated by the middleware stack below.
#[must_use]
pub fn build_router(config: GatewayConfig) -> Router {
    let config = Arc::new(config);
    let client = build_client(config.transport);
    let rate_limiter = RateLimiter::new(config.rate_limit);

    let access_log = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!("http_request", method = %request.method(), path = %request.uri().path())
        })
        .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
            tracing::info!(status = %response.status(), latency_ms = latency.as_millis(), "request completed");
        })
        .on_body_chunk(|_chunk: &Bytes, _latency: Duration, _span: &Span| {});

    // `.layer()` wraps the current stack, so the LAST call here ends up
    // OUTERMOST and runs first per request. Adding in this order yields,
    // outermost to innermost: panic recovery, correlation id, access log,
    // CORS, rate limit, auth, proxy — the spec's fixed pipeline order.
    Router::new()
        .route("/*path", any(proxy))
        .route("/", any(proxy))
        .layer(axum::extract::Extension(client))
        .layer(middleware::from_fn_with_state(Arc::clone(&config), require_auth))
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(cors_layer(&config.cors_origins))
        .layer(access_log)
        .layer(correlation_id_layer())
        .layer(CatchPanicLayer::custom(on_panic))
        .with_state(config)
}
