//! Reverse proxy: matches the inbound path against the static routing
//! table and forwards the request to the chosen backend, preserving
//! method, headers, and body.

use crate::config::{GatewayConfig, Route, TransportPolicy};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use composable_rust_web::error::AppError;
use std::sync::Arc;

/// Headers forwarded to the backend unchanged; everything else that looks
/// like hop-by-hop or gateway-internal metadata is dropped.
const FORWARDED_HEADERS: [&str; 6] =
    ["authorization", "x-forwarded-for", "x-forwarded-host", "x-forwarded-proto", "x-correlation-id", "content-type"];

/// Builds a `reqwest::Client` honoring the gateway's transport policy: a
/// single slow backend must not exhaust the gateway's connection pool.
#[must_use]
pub fn build_client(policy: TransportPolicy) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(policy.dial_timeout)
        .pool_idle_timeout(policy.idle_timeout)
        .pool_max_idle_per_host(policy.max_idle_per_host)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn route_for<'a>(routes: &'a [Route], path: &str) -> Option<&'a Route> {
    routes.iter().find(|route| path.starts_with(route.prefix))
}

/// Reverse-proxies `request` to whichever backend its path prefix maps to.
///
/// # Errors
///
/// Returns `404` if no route matches, `502` if the backend is unreachable,
/// the response headers don't arrive within the configured timeout, or the
/// backend itself responds with a 5xx (its body is never forwarded to the
/// client in that case — only logged).
pub async fn proxy(
    State(config): State<Arc<GatewayConfig>>,
    axum::extract::Extension(client): axum::extract::Extension<reqwest::Client>,
    request: Request,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    let route = route_for(&config.routes, &path).ok_or_else(|| AppError::not_found("route", &path))?;

    let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
        .map_err(|_| AppError::bad_request("unsupported method"))?;
    let url = format!(
        "{}{}",
        route.backend_url.trim_end_matches('/'),
        request.uri().path_and_query().map_or(path.as_str(), |pq| pq.as_str())
    );

    let mut builder = client.request(method, &url);
    for name in FORWARDED_HEADERS {
        if let Some(value) = request.headers().get(name) {
            builder = builder.header(name, value);
        }
    }
    for name in ["x-user-id", "x-user-email", "x-user-role"] {
        if let Some(value) = request.headers().get(name) {
            builder = builder.header(name, value);
        }
    }

    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|_| AppError::bad_request("failed to read request body"))?;
    let builder = builder.body(body.to_vec()).timeout(config.transport.response_header_timeout);

    let upstream = builder
        .send()
        .await
        .map_err(|error| AppError::bad_gateway(format!("upstream request failed: {error}")))?;

    let status = upstream.status();

    if status.is_server_error() {
        let response_body = upstream.text().await.unwrap_or_default();
        tracing::error!(upstream_status = %status, upstream_body = %response_body, "backend returned a server error");
        return Ok(AppError::bad_gateway(format!("upstream returned {status}")).into_response());
    }

    let response_headers = upstream.headers().clone();
    let response_body = upstream.bytes().await.unwrap_or_default();

    let mut response = Response::builder().status(status.as_u16());
    if let Some(headers) = response.headers_mut() {
        for (name, value) in &response_headers {
            if name != "content-length" {
                headers.insert(name, value.clone());
            }
        }
    }

    Ok(response
        .body(Body::from(response_body))
        .map_err(|_| AppError::internal("failed to build proxied response"))?
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn route_for_matches_longest_configured_prefix() {
        let routes = vec![
            Route { prefix: "/api/v1/products", backend_url: "http://product:8001".to_string() },
            Route { prefix: "/api/v1/orders", backend_url: "http://order:8003".to_string() },
        ];
        let matched = route_for(&routes, "/api/v1/orders/123").expect("should match");
        assert_eq!(matched.backend_url, "http://order:8003");
    }

    #[test]
    fn route_for_returns_none_on_unmatched_path() {
        let routes = vec![Route { prefix: "/api/v1/products", backend_url: "http://product:8001".to_string() }];
        assert!(route_for(&routes, "/unknown").is_none());
    }
}
