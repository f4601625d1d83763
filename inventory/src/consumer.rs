//! Background consumer that finalizes reservations by watching the order
//! aggregate's lifecycle events, rather than being called directly by the
//! order service. This keeps order and inventory from depending on each
//! other synchronously: order only ever publishes, inventory only ever
//! subscribes.
//!
//! Modeled on the projection manager's subscribe-and-select loop: open one
//! `EventStream` per topic, drain it with `tokio::select!`, and watch a
//! shutdown signal alongside it.

use crate::reducer::{InventoryEnvironment, InventoryReducer};
use crate::types::{InventoryAction, InventoryState};
use composable_rust_core::event_bus::EventBus;
use composable_rust_runtime::Store;
use ecommerce_order::OrderAction;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;

const ORDER_CONFIRMED_TOPIC: &str = "ecommerce.order.confirmed";
const ORDER_CANCELED_TOPIC: &str = "ecommerce.order.canceled";

/// Consumes order lifecycle events and confirms or releases the matching
/// reservation batch. Runs until `shutdown` is set to `true`.
pub async fn run(
    store: Arc<Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>>,
    event_bus: Arc<dyn EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut events = match event_bus.subscribe(&[ORDER_CONFIRMED_TOPIC, ORDER_CANCELED_TOPIC]).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!("inventory order-event consumer failed to subscribe: {error}");
            return;
        },
    };

    tracing::info!("inventory order-event consumer subscribed to {ORDER_CONFIRMED_TOPIC}, {ORDER_CANCELED_TOPIC}");

    while !*shutdown.borrow() {
        tokio::select! {
            Some(event_result) = events.next() => {
                match event_result {
                    Ok(serialized) => handle_event(&store, &serialized).await,
                    Err(error) => tracing::warn!("inventory order-event consumer: stream error: {error}"),
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            },
        }
    }

    tracing::info!("inventory order-event consumer shutting down");
}

async fn handle_event(
    store: &Arc<Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>>,
    serialized: &composable_rust_core::event::SerializedEvent,
) {
    let action: OrderAction = match bincode::deserialize(&serialized.data) {
        Ok(action) => action,
        Err(error) => {
            tracing::error!("failed to decode order event for inventory consumer: {error}");
            return;
        },
    };

    match action {
        OrderAction::OrderCreated { checkout_session_id: Some(checkout_id), .. } => {
            let _ = store.send(InventoryAction::ConfirmReservations { checkout_id }).await;
        },
        OrderAction::OrderCanceled { checkout_session_id: Some(checkout_id), .. } => {
            let _ = store.send(InventoryAction::ReleaseReservations { checkout_id }).await;
        },
        OrderAction::OrderCreated { checkout_session_id: None, .. }
        | OrderAction::OrderCanceled { checkout_session_id: None, .. } => {
            tracing::debug!("order event carried no checkout_session_id, nothing to confirm/release");
        },
        _ => {},
    }
}
