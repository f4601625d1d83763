//! Inventory service: stock levels and time-boxed reservations, event-sourced
//! through the shared `EventStore`/`EventBus` abstractions.
//!
//! Reservations are confirmed or released by consuming `order.confirmed`/
//! `order.canceled` off the event bus (see `main`'s background consumer),
//! not by a direct HTTP call from the order service.

pub mod consumer;
pub mod handlers;
pub mod reducer;
pub mod router;
pub mod sweeper;
pub mod types;

pub use reducer::{InventoryEnvironment, InventoryReducer};
pub use types::{InventoryAction, InventoryState, ReservationId, StockKey};
