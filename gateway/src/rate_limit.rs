//! Per-client-IP token bucket rate limiting.
//!
//! Shaped like `composable_rust_web::middleware::CorrelationIdMiddleware`:
//! a `tower::Layer`/`Service` pair wrapping the inner router, rather than an
//! `axum::middleware::from_fn` function, since this middleware needs to
//! hold shared mutable state (the per-IP bucket table) across requests.

use crate::config::RateLimitPolicy;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use composable_rust_web::error::AppError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(burst: f64) -> Self {
        Self { tokens: burst, last_refill: Instant::now() }
    }

    /// Refills based on elapsed time, then takes one token if available.
    fn try_take(&mut self, policy: RateLimitPolicy) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * policy.rate_per_second).min(policy.burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared rate limiter state: one bucket per client IP seen so far.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, TokenBucket>>>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Creates a rate limiter for the given policy.
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { buckets: Arc::new(Mutex::new(HashMap::new())), policy }
    }

    /// Whether `ip` may make a request right now; consumes a token if so.
    ///
    /// # Panics
    ///
    /// Panics if the bucket table's lock is poisoned, which only happens
    /// if another thread panicked while holding it.
    #[must_use]
    pub fn allow(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets.entry(ip).or_insert_with(|| TokenBucket::new(self.policy.burst)).try_take(self.policy)
    }
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

/// Layer applying [`RateLimiter`] to every request.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    /// Creates a layer backed by `limiter`.
    #[must_use]
    pub const fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware { inner, limiter: self.limiter.clone() }
    }
}

/// Middleware service enforcing the rate limit.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> Service<Request> for RateLimitMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let ip = client_ip(&request);
        let allowed = self.limiter.allow(ip);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if allowed {
                inner.call(request).await
            } else {
                Ok(AppError::new(
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    "rate limit exceeded".to_string(),
                    "RATE_LIMITED".to_string(),
                )
                .into_response())
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_up_to_burst_then_blocks() {
        let policy = RateLimitPolicy { rate_per_second: 0.0, burst: 2.0 };
        let mut bucket = TokenBucket::new(policy.burst);
        assert!(bucket.try_take(policy));
        assert!(bucket.try_take(policy));
        assert!(!bucket.try_take(policy));
    }

    #[test]
    fn different_ips_have_independent_buckets() {
        let limiter = RateLimiter::new(RateLimitPolicy { rate_per_second: 0.0, burst: 1.0 });
        let a = IpAddr::from([10, 0, 0, 1]);
        let b = IpAddr::from([10, 0, 0, 2]);

        assert!(limiter.allow(a));
        assert!(!limiter.allow(a));
        assert!(limiter.allow(b));
    }
}
