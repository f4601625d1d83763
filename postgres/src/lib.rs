//! `PostgreSQL` event store implementation for Composable Rust.
//!
//! This crate provides a production-ready PostgreSQL-based event store that implements
//! the `EventStore` trait from `composable-rust-core`. It uses sqlx for compile-time
//! checked queries and supports:
//!
//! - Event persistence with optimistic concurrency
//! - State snapshots for performance
//! - Connection pooling
//! - Transaction support
//!
//! # Example
//!
//! ```ignore
//! use composable_rust_postgres::PostgresEventStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let event_store = PostgresEventStore::new("postgres://localhost/mydb").await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Dead-letter queue for events that failed to persist or publish.
pub mod dead_letter_queue;

/// `PostgreSQL`-backed `EventStore` implementation.
pub mod event_store;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueue, FailedEvent};
pub use event_store::PostgresEventStore;
