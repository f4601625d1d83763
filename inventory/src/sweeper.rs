//! Periodic sweep that expires reservations past their TTL.
//!
//! A checkout session that never calls back (a crashed browser tab, an
//! abandoned cart) would otherwise hold stock forever. This task dispatches
//! `SweepExpired` on a fixed interval so expiry doesn't depend on any
//! caller showing back up.

use crate::reducer::{InventoryEnvironment, InventoryReducer};
use crate::types::{InventoryAction, InventoryState};
use composable_rust_core::environment::Clock;
use composable_rust_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Runs the expiry sweep on `interval` until `shutdown` is set to `true`.
pub async fn run(
    store: Arc<Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = store.send(InventoryAction::SweepExpired { now: clock.now() }).await;
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            },
        }
    }

    tracing::info!("inventory expiry sweeper shutting down");
}
