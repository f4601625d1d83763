//! Cart service: per-user cart state in Redis, version-gated writes, no
//! event log. The only service in the platform that isn't built on the
//! `Reducer`/`EventStore` shared kernel — a cart is in-memory-speed mutable
//! state, not an aggregate with history.

pub mod error;
pub mod handlers;
pub mod router;
pub mod store;
pub mod types;

pub use error::CartError;
pub use store::RedisCartStore;
pub use types::{Cart, CartItem};
