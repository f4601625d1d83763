//! API gateway: the sole network ingress. Terminates JWT verification,
//! enforces a per-IP rate limit, injects trusted identity headers, and
//! reverse-proxies to exactly one backend chosen by URL prefix.
//!
//! Unlike the other services in this workspace, the gateway has no
//! `Reducer`/`Store` of its own — there's no domain state to own, only a
//! fixed request pipeline (see [`pipeline::build_router`]).

pub mod auth;
pub mod config;
pub mod pipeline;
pub mod proxy;
pub mod rate_limit;

pub use config::GatewayConfig;
pub use pipeline::build_router;
