//! Payment service: provider-agnostic initiate/refund/cancel over a closed
//! capability enum, event-sourced through the shared `EventStore`/`EventBus`
//! abstractions.
//!
//! `StripeLike` and `Mock` providers settle synchronously; `PayPalLike`
//! always defers to [`handlers::settle_webhook`], simulating the async
//! confirmation a redirect-based provider would deliver. Settlement, sync
//! or async, reports its outcome back to the checkout saga over HTTP so the
//! saga can proceed or compensate.

pub mod handlers;
pub mod provider;
pub mod reducer;
pub mod router;
pub mod types;

pub use provider::PaymentProvider;
pub use reducer::{PaymentEnvironment, PaymentReducer};
pub use types::{PaymentAction, PaymentId, PaymentsState};
