//! Gateway configuration: routing table, JWT secret, CORS origins, and rate
//! limit parameters. Loaded from the environment at startup; there is no
//! dynamic reconfiguration.

use std::time::Duration;

/// One entry in the static routing table: requests whose path starts with
/// `prefix` are proxied to `backend_url`.
#[derive(Debug, Clone)]
pub struct Route {
    /// Path prefix, e.g. `/api/v1/products`.
    pub prefix: &'static str,
    /// Backend base URL, e.g. `http://localhost:8001`.
    pub backend_url: String,
}

/// The gateway's static routing table, one entry per backend service.
/// Order matters: the first matching prefix wins, so more specific
/// prefixes must be listed before their shorter overlaps.
#[must_use]
pub fn routing_table(host_for: impl Fn(&str, u16) -> String) -> Vec<Route> {
    let backends: &[(&str, &str, u16)] = &[
        ("/api/v1/products", "product", 8001),
        ("/api/v1/cart", "cart", 8002),
        ("/api/v1/orders", "order", 8003),
        ("/api/v1/checkout", "checkout", 8004),
        ("/api/v1/payments", "payment", 8005),
        ("/api/v1/users", "user", 8006),
        ("/api/v1/auth", "user", 8006),
        ("/api/v1/inventory", "inventory", 8007),
        ("/api/v1/campaigns", "campaign", 8008),
        ("/api/v1/notifications", "notification", 8009),
        ("/api/v1/search", "search", 8010),
        ("/api/v1/media", "media", 8011),
    ];

    backends
        .iter()
        .map(|(prefix, host, port)| Route { prefix, backend_url: host_for(host, *port) })
        .collect()
}

/// A (method, path-prefix) rule matched against every request before
/// requiring a bearer token.
#[derive(Debug, Clone, Copy)]
pub struct PublicRoute {
    /// HTTP method the rule applies to.
    pub method: &'static str,
    /// Path prefix the rule applies to.
    pub prefix: &'static str,
}

/// Routes that bypass authentication. `OPTIONS` (CORS preflight) is handled
/// separately, not listed here.
pub const PUBLIC_ROUTES: &[PublicRoute] = &[
    PublicRoute { method: "GET", prefix: "/api/v1/products" },
    PublicRoute { method: "GET", prefix: "/api/v1/search" },
    PublicRoute { method: "POST", prefix: "/api/v1/auth" },
    PublicRoute { method: "GET", prefix: "/health" },
];

/// Transport policy for the reverse-proxy HTTP client: a single slow
/// backend must not exhaust the gateway.
#[derive(Debug, Clone, Copy)]
pub struct TransportPolicy {
    /// Upper bound on establishing a connection to a backend.
    pub dial_timeout: Duration,
    /// Upper bound on waiting for a backend's response headers.
    pub response_header_timeout: Duration,
    /// How long an idle pooled connection is kept before being closed.
    pub idle_timeout: Duration,
    /// Maximum idle connections held across all backends.
    pub max_idle_connections: usize,
    /// Maximum idle connections held per backend host.
    pub max_idle_per_host: usize,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            response_header_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            max_idle_connections: 100,
            max_idle_per_host: 10,
        }
    }
}

/// Token-bucket rate limit parameters, keyed per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Steady-state requests per second allowed per client.
    pub rate_per_second: f64,
    /// Maximum burst size above the steady-state rate.
    pub burst: f64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { rate_per_second: 20.0, burst: 40.0 }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the gateway's HTTP listener binds to.
    pub listen_addr: String,
    /// Shared secret used to verify inbound JWTs (HMAC).
    pub jwt_secret: String,
    /// Origins allowed by CORS. `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Rate limit policy applied per client IP.
    pub rate_limit: RateLimitPolicy,
    /// Transport policy for the reverse-proxy client.
    pub transport: TransportPolicy,
    /// Static routing table.
    pub routes: Vec<Route>,
}

/// Placeholder JWT secret used when `JWT_SECRET` isn't set. Only tolerated
/// when `APP_ENV=development`.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

impl GatewayConfig {
    /// Builds configuration from environment variables, matching each
    /// backend's own `LISTEN_ADDR` default port when `<NAME>_SERVICE_URL`
    /// isn't set.
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` is set to anything other than `development` while
    /// `JWT_SECRET` is unset or still the default placeholder — a
    /// non-development gateway must never verify tokens against a secret
    /// every clone of this repo shares.
    #[must_use]
    pub fn from_env() -> Self {
        let host_for = |name: &str, default_port: u16| -> String {
            std::env::var(format!("{}_SERVICE_URL", name.to_uppercase()))
                .unwrap_or_else(|_| format!("http://localhost:{default_port}"))
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());
        assert!(
            app_env == "development" || jwt_secret != DEFAULT_JWT_SECRET,
            "JWT_SECRET must be set to a non-default value when APP_ENV={app_env}"
        );

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            jwt_secret,
            cors_origins,
            rate_limit: RateLimitPolicy::default(),
            transport: TransportPolicy::default(),
            routes: routing_table(host_for),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn routing_table_covers_every_backend_prefix() {
        let routes = routing_table(|host, port| format!("http://{host}:{port}"));
        assert!(routes.iter().any(|r| r.prefix == "/api/v1/products"));
        assert!(routes.iter().any(|r| r.prefix == "/api/v1/media"));
        assert_eq!(routes.len(), 12);
    }

    #[test]
    fn public_routes_cover_the_spec_exemption_list() {
        assert!(PUBLIC_ROUTES.iter().any(|r| r.method == "GET" && r.prefix == "/api/v1/products"));
        assert!(PUBLIC_ROUTES.iter().any(|r| r.method == "POST" && r.prefix == "/api/v1/auth"));
        assert!(!PUBLIC_ROUTES.iter().any(|r| r.prefix == "/api/v1/orders"));
    }
}
