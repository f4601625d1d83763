//! Inventory reducer implementing stock and reservation bookkeeping.
//!
//! Unlike the order aggregate, a single inventory command can produce a
//! variable number of fine-grained events (one `StockReserved` per line,
//! one `StockUpdated` per affected row, an optional `LowStock`), which
//! doesn't fit the single-command-single-event round trip the order
//! reducer uses. So state here is mutated directly and synchronously
//! inside `reduce` — the same direct-mutation treatment the checkout saga
//! gives its synchronous commands — and the resulting events are persisted
//! and published as a best-effort batch afterward, for audit and for
//! downstream consumers. Event re-entry arms below are therefore no-ops:
//! the mutation already happened when the command was handled.
//!
//! The reducer's single-writer lock (guaranteed by `Store::send` executing
//! synchronously) is what gives `Reserve`'s all-or-nothing, per-row-checked
//! semantics their serialization guarantee, standing in for the
//! `SELECT FOR UPDATE` transaction a SQL-backed implementation would use.

use crate::types::{
    InventoryAction, InventoryState, ReservationId, ReservationLineRequest, ReservationStatus,
    StockKey, StockMovement, StockRecord, DEFAULT_WAREHOUSE,
};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_core::reducer::Reducer;
use composable_rust_core::stream::StreamId;
use composable_rust_core::{append_events, publish_event};
use std::collections::HashMap;
use std::sync::Arc;

/// Topic an inventory event is published to. Events with no topic here
/// (`ReservationConfirmed`, `StockAdjusted`) are recorded in state and the
/// audit log but have no external subscriber per the spec this was built
/// against.
fn topic_for(action: &InventoryAction) -> Option<&'static str> {
    match action {
        InventoryAction::StockReserved { .. } => Some("ecommerce.inventory.reserved"),
        InventoryAction::StockUpdated { .. } => Some("ecommerce.inventory.updated"),
        InventoryAction::LowStock { .. } => Some("ecommerce.inventory.low_stock"),
        InventoryAction::ReservationReleased { .. } => Some("ecommerce.inventory.released"),
        _ => None,
    }
}

/// Environment for inventory processing: the event store and bus for
/// audit/publication, plus a clock for deterministic timestamps.
#[derive(Clone)]
pub struct InventoryEnvironment {
    /// Event store for persisting inventory events.
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for publishing inventory events to downstream consumers.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for generating timestamps.
    pub clock: Arc<dyn Clock>,
}

impl InventoryEnvironment {
    /// Creates a new inventory environment.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, event_bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            event_store,
            event_bus,
            clock,
        }
    }
}

fn validation_failed_effect(error: String) -> Effect<InventoryAction> {
    Effect::Future(Box::pin(
        async move { Some(InventoryAction::ValidationFailed { error }) },
    ))
}

/// Reducer implementing the inventory aggregate's business logic.
#[derive(Clone, Default)]
pub struct InventoryReducer;

impl InventoryReducer {
    /// Creates a new inventory reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn serialize_event(action: &InventoryAction) -> Result<SerializedEvent, String> {
        let event_type = action.event_type().to_string();
        let data =
            bincode::serialize(action).map_err(|e| format!("failed to serialize event: {e}"))?;
        Ok(SerializedEvent::new(event_type, data, None))
    }

    /// Persists `events` as one batch to `stream_id` and publishes each one
    /// that has a topic. Best-effort: a store or bus failure is logged but
    /// never rolls back the state mutation that already happened.
    fn persist_and_publish_effects(
        env: &InventoryEnvironment,
        stream_id: StreamId,
        events: Vec<InventoryAction>,
    ) -> Vec<Effect<InventoryAction>> {
        if events.is_empty() {
            return vec![Effect::None];
        }

        let mut serialized = Vec::with_capacity(events.len());
        for event in &events {
            match Self::serialize_event(event) {
                Ok(s) => serialized.push(s),
                Err(error) => {
                    tracing::error!("failed to serialize inventory event: {error}");
                    return vec![validation_failed_effect(error)];
                },
            }
        }

        let event_store = Arc::clone(&env.event_store);
        let event_bus = Arc::clone(&env.event_bus);

        let append_effect = append_events! {
            store: event_store,
            stream: stream_id.as_str(),
            expected_version: None,
            events: serialized.clone(),
            on_success: |_version| None,
            on_error: |error| {
                tracing::error!("failed to append inventory events: {error}");
                None
            }
        };

        let publish_effects: Vec<Effect<InventoryAction>> = events
            .iter()
            .zip(serialized)
            .filter_map(|(event, serialized_event)| {
                let topic = topic_for(event)?;
                let bus = Arc::clone(&event_bus);
                Some(publish_event! {
                    bus: bus,
                    topic: topic,
                    event: serialized_event,
                    on_success: || None,
                    on_error: |error| {
                        tracing::warn!("failed to publish inventory event to {topic}: {error}");
                        None
                    }
                })
            })
            .collect();

        if publish_effects.is_empty() {
            return vec![append_effect];
        }

        vec![Effect::Sequential(vec![append_effect, Effect::Parallel(publish_effects)])]
    }

    /// Checks that every line in a reservation request can be satisfied,
    /// accounting for earlier lines in the same request that target the
    /// same stock row. Read-only: no state is mutated.
    fn validate_reserve(
        state: &InventoryState,
        items: &[ReservationLineRequest],
    ) -> Result<(), String> {
        let mut planned: HashMap<StockKey, i64> = HashMap::new();
        for item in items {
            if item.quantity <= 0 {
                return Err(format!("item '{}' has non-positive quantity", item.product_id));
            }
            let key = StockKey::new(item.product_id.clone(), item.variant_id.clone(), DEFAULT_WAREHOUSE.to_string());
            let available = state.stock_for(&key).map_or(0, StockRecord::available);
            let already_planned = *planned.get(&key).unwrap_or(&0);
            if available - already_planned < item.quantity {
                return Err(format!("insufficient_stock: {}", item.product_id));
            }
            planned.insert(key, already_planned + item.quantity);
        }
        Ok(())
    }

    fn stock_updated_event(record: &StockRecord) -> InventoryAction {
        InventoryAction::StockUpdated {
            product_id: record.product_id.clone(),
            variant_id: record.variant_id.clone(),
            warehouse_id: record.warehouse_id.clone(),
            quantity: record.quantity,
            reserved: record.reserved,
            available: record.available(),
        }
    }

    fn low_stock_event_if_needed(record: &StockRecord) -> Option<InventoryAction> {
        record.is_low().then(|| InventoryAction::LowStock {
            product_id: record.product_id.clone(),
            variant_id: record.variant_id.clone(),
            warehouse_id: record.warehouse_id.clone(),
            available: record.available(),
            threshold: record.low_stock_threshold,
        })
    }
}

impl Reducer for InventoryReducer {
    type State = InventoryState;
    type Action = InventoryAction;
    type Environment = InventoryEnvironment;

    #[allow(clippy::cognitive_complexity)]
    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            InventoryAction::Reserve {
                checkout_id,
                items,
                ttl_seconds,
            } => {
                if !state.reservations_for_checkout(&checkout_id).is_empty() {
                    tracing::info!("Reserve is a no-op: checkout {checkout_id} already reserved");
                    return vec![Effect::None];
                }

                if items.is_empty() {
                    return vec![validation_failed_effect(
                        "reservation must contain at least one item".to_string(),
                    )];
                }

                if let Err(error) = Self::validate_reserve(state, &items) {
                    tracing::warn!("Reserve validation failed: {error}");
                    return vec![validation_failed_effect(error)];
                }

                let now = env.clock.now();
                let expires_at = now + chrono::Duration::seconds(ttl_seconds.max(0));
                let mut events = Vec::new();
                let mut touched: Vec<StockKey> = Vec::new();

                for item in &items {
                    let key = StockKey::new(
                        item.product_id.clone(),
                        item.variant_id.clone(),
                        DEFAULT_WAREHOUSE.to_string(),
                    );
                    let reservation_id = ReservationId::generate();
                    let record = state
                        .stock
                        .entry(key.clone())
                        .or_insert_with(|| StockRecord::new(&key, 0, now));
                    record.reserved += item.quantity;
                    record.updated_at = now;

                    state.reservations.insert(
                        reservation_id.clone(),
                        crate::types::StockReservation {
                            id: reservation_id.clone(),
                            checkout_id: checkout_id.clone(),
                            product_id: item.product_id.clone(),
                            variant_id: item.variant_id.clone(),
                            warehouse_id: key.warehouse_id.clone(),
                            quantity: item.quantity,
                            status: ReservationStatus::Active,
                            expires_at,
                            created_at: now,
                        },
                    );

                    events.push(InventoryAction::StockReserved {
                        reservation_id,
                        checkout_id: checkout_id.clone(),
                        product_id: item.product_id.clone(),
                        variant_id: item.variant_id.clone(),
                        warehouse_id: key.warehouse_id.clone(),
                        quantity: item.quantity,
                        expires_at,
                    });

                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }

                for key in &touched {
                    if let Some(record) = state.stock.get(key) {
                        events.push(Self::stock_updated_event(record));
                        if let Some(low) = Self::low_stock_event_if_needed(record) {
                            events.push(low);
                        }
                    }
                }

                let stream_id = StreamId::new(format!("inventory-reservation-{checkout_id}"));
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            InventoryAction::ConfirmReservations { checkout_id } => {
                let ids: Vec<ReservationId> = state
                    .reservations_for_checkout(&checkout_id)
                    .into_iter()
                    .filter(|r| r.status == ReservationStatus::Active)
                    .map(|r| r.id.clone())
                    .collect();

                if ids.is_empty() {
                    tracing::info!("ConfirmReservations is a no-op: no active reservations for {checkout_id}");
                    return vec![Effect::None];
                }

                let now = env.clock.now();
                let mut events = Vec::new();
                let mut touched: Vec<StockKey> = Vec::new();

                for id in ids {
                    let Some(reservation) = state.reservations.get(&id).cloned() else {
                        continue;
                    };
                    let key = reservation.stock_key();

                    if let Some(record) = state.stock.get_mut(&key) {
                        record.quantity -= reservation.quantity;
                        record.reserved -= reservation.quantity;
                        record.updated_at = now;
                    }
                    if let Some(r) = state.reservations.get_mut(&id) {
                        r.status = ReservationStatus::Confirmed;
                    }

                    state.movements.push(StockMovement {
                        product_id: reservation.product_id.clone(),
                        variant_id: reservation.variant_id.clone(),
                        warehouse_id: reservation.warehouse_id.clone(),
                        delta: -reservation.quantity,
                        reason: "order".to_string(),
                        reference: checkout_id.clone(),
                        timestamp: now,
                    });

                    events.push(InventoryAction::ReservationConfirmed {
                        reservation_id: id,
                        checkout_id: checkout_id.clone(),
                        quantity: reservation.quantity,
                    });

                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }

                for key in &touched {
                    if let Some(record) = state.stock.get(key) {
                        events.push(Self::stock_updated_event(record));
                        if let Some(low) = Self::low_stock_event_if_needed(record) {
                            events.push(low);
                        }
                    }
                }

                let stream_id = StreamId::new(format!("inventory-reservation-{checkout_id}"));
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            InventoryAction::ReleaseReservations { checkout_id } => {
                let ids: Vec<ReservationId> = state
                    .reservations_for_checkout(&checkout_id)
                    .into_iter()
                    .filter(|r| r.status == ReservationStatus::Active)
                    .map(|r| r.id.clone())
                    .collect();

                if ids.is_empty() {
                    tracing::info!("ReleaseReservations is a no-op: no active reservations for {checkout_id}");
                    return vec![Effect::None];
                }

                let now = env.clock.now();
                let mut events = Vec::new();
                let mut touched: Vec<StockKey> = Vec::new();

                for id in ids {
                    let Some(reservation) = state.reservations.get(&id).cloned() else {
                        continue;
                    };
                    let key = reservation.stock_key();

                    if let Some(record) = state.stock.get_mut(&key) {
                        record.reserved -= reservation.quantity;
                        record.updated_at = now;
                    }
                    if let Some(r) = state.reservations.get_mut(&id) {
                        r.status = ReservationStatus::Released;
                    }

                    events.push(InventoryAction::ReservationReleased {
                        reservation_id: id,
                        checkout_id: checkout_id.clone(),
                        quantity: reservation.quantity,
                    });

                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }

                for key in &touched {
                    if let Some(record) = state.stock.get(key) {
                        events.push(Self::stock_updated_event(record));
                    }
                }

                let stream_id = StreamId::new(format!("inventory-reservation-{checkout_id}"));
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            InventoryAction::Adjust {
                product_id,
                variant_id,
                warehouse_id,
                delta,
                reason,
                reference,
            } => {
                let key = StockKey::new(product_id.clone(), variant_id.clone(), warehouse_id.clone());
                let now = env.clock.now();
                let new_quantity = {
                    let record = state
                        .stock
                        .entry(key.clone())
                        .or_insert_with(|| StockRecord::new(&key, 0, now));
                    record.quantity + delta
                };

                if new_quantity < 0 {
                    return vec![validation_failed_effect(format!(
                        "adjustment would make quantity negative for {product_id}"
                    ))];
                }

                let record = state.stock.get_mut(&key).expect("just inserted or present");
                record.quantity = new_quantity;
                record.updated_at = now;
                let snapshot = record.clone();

                state.movements.push(StockMovement {
                    product_id: product_id.clone(),
                    variant_id: variant_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                    delta,
                    reason: reason.clone(),
                    reference: reference.clone(),
                    timestamp: now,
                });

                let mut events = vec![InventoryAction::StockAdjusted {
                    product_id,
                    variant_id,
                    warehouse_id,
                    delta,
                    reason,
                    reference,
                    quantity_after: snapshot.quantity,
                }];
                events.push(Self::stock_updated_event(&snapshot));
                if let Some(low) = Self::low_stock_event_if_needed(&snapshot) {
                    events.push(low);
                }

                let stream_id = StreamId::new(format!("inventory-stock-{}-{}", key.product_id, key.warehouse_id));
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            InventoryAction::SweepExpired { now } => {
                let due = state.expired_active_reservations(now);
                if due.is_empty() {
                    return vec![Effect::None];
                }

                let mut events = Vec::new();
                let mut touched: Vec<StockKey> = Vec::new();

                for id in due {
                    let Some(reservation) = state.reservations.get(&id).cloned() else {
                        continue;
                    };
                    let key = reservation.stock_key();

                    if let Some(record) = state.stock.get_mut(&key) {
                        record.reserved -= reservation.quantity;
                        record.updated_at = now;
                    }
                    if let Some(r) = state.reservations.get_mut(&id) {
                        r.status = ReservationStatus::Expired;
                    }

                    tracing::info!(
                        reservation_id = reservation.id.as_str(),
                        checkout_id = %reservation.checkout_id,
                        "reservation expired, stock released"
                    );

                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }

                for key in &touched {
                    if let Some(record) = state.stock.get(key) {
                        events.push(Self::stock_updated_event(record));
                    }
                }

                if events.is_empty() {
                    return vec![Effect::None];
                }

                let stream_id = StreamId::new("inventory-sweep".to_string());
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            // ========== Event re-entry (already applied synchronously above) ==========
            InventoryAction::StockReserved { .. }
            | InventoryAction::StockUpdated { .. }
            | InventoryAction::LowStock { .. }
            | InventoryAction::ReservationConfirmed { .. }
            | InventoryAction::ReservationReleased { .. }
            | InventoryAction::StockAdjusted { .. }
            | InventoryAction::ValidationFailed { .. } => vec![Effect::None],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::ReservationLineRequest;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};
    use composable_rust_testing::FixedClock;

    fn env() -> InventoryEnvironment {
        InventoryEnvironment::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(FixedClock::new(chrono::Utc::now())),
        )
    }

    fn stocked(product_id: &str, quantity: i64, threshold: i64) -> InventoryState {
        let mut state = InventoryState::new();
        let key = StockKey::new(product_id.to_string(), None, DEFAULT_WAREHOUSE.to_string());
        let mut record = StockRecord::new(&key, threshold, chrono::Utc::now());
        record.quantity = quantity;
        state.stock.insert(key, record);
        state
    }

    #[test]
    fn reserve_rejects_insufficient_stock() {
        let mut state = stocked("widget", 1, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        let effects = reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 5,
                }],
                ttl_seconds: 900,
            },
            &environment,
        );

        assert_eq!(effects.len(), 1);
        assert!(state.reservations.is_empty());
    }

    #[test]
    fn reserve_holds_stock_and_is_idempotent_per_checkout() {
        let mut state = stocked("widget", 10, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 3,
                }],
                ttl_seconds: 900,
            },
            &environment,
        );

        assert_eq!(state.reservations_for_checkout("checkout-1").len(), 1);
        let key = StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string());
        assert_eq!(state.stock_for(&key).unwrap().reserved, 3);

        // Calling Reserve again for the same checkout is a no-op, not a second hold.
        reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 3,
                }],
                ttl_seconds: 900,
            },
            &environment,
        );

        assert_eq!(state.reservations_for_checkout("checkout-1").len(), 1);
        assert_eq!(state.stock_for(&key).unwrap().reserved, 3);
    }

    #[test]
    fn confirm_decrements_quantity_and_reserved() {
        let mut state = stocked("widget", 10, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 4,
                }],
                ttl_seconds: 900,
            },
            &environment,
        );

        reducer.reduce(
            &mut state,
            InventoryAction::ConfirmReservations {
                checkout_id: "checkout-1".to_string(),
            },
            &environment,
        );

        let key = StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string());
        let record = state.stock_for(&key).unwrap();
        assert_eq!(record.quantity, 6);
        assert_eq!(record.reserved, 0);
        assert_eq!(
            state.reservations_for_checkout("checkout-1")[0].status,
            ReservationStatus::Confirmed
        );
    }

    #[test]
    fn release_restores_available_without_touching_quantity() {
        let mut state = stocked("widget", 10, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 4,
                }],
                ttl_seconds: 900,
            },
            &environment,
        );

        reducer.reduce(
            &mut state,
            InventoryAction::ReleaseReservations {
                checkout_id: "checkout-1".to_string(),
            },
            &environment,
        );

        let key = StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string());
        let record = state.stock_for(&key).unwrap();
        assert_eq!(record.quantity, 10);
        assert_eq!(record.reserved, 0);
        assert_eq!(record.available(), 10);
    }

    #[test]
    fn adjust_rejects_negative_result() {
        let mut state = stocked("widget", 2, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        let effects = reducer.reduce(
            &mut state,
            InventoryAction::Adjust {
                product_id: "widget".to_string(),
                variant_id: None,
                warehouse_id: DEFAULT_WAREHOUSE.to_string(),
                delta: -5,
                reason: "correction".to_string(),
                reference: "audit-1".to_string(),
            },
            &environment,
        );

        assert_eq!(effects.len(), 1);
        let key = StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string());
        assert_eq!(state.stock_for(&key).unwrap().quantity, 2);
    }

    #[test]
    fn sweep_releases_only_expired_active_reservations() {
        let mut state = stocked("widget", 10, 0);
        let environment = env();
        let reducer = InventoryReducer::new();

        reducer.reduce(
            &mut state,
            InventoryAction::Reserve {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReservationLineRequest {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 4,
                }],
                ttl_seconds: 1,
            },
            &environment,
        );

        let future = environment.clock.now() + chrono::Duration::seconds(10);
        reducer.reduce(&mut state, InventoryAction::SweepExpired { now: future }, &environment);

        let key = StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string());
        assert_eq!(state.stock_for(&key).unwrap().reserved, 0);
        assert_eq!(
            state.reservations_for_checkout("checkout-1")[0].status,
            ReservationStatus::Expired
        );
    }
}
