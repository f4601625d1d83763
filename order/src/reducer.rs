//! Order reducer implementing the order aggregate's business logic.
//!
//! Commands are validated against current state; valid commands produce
//! events that are persisted to the event store and published to the
//! event bus. Events are then replayed through [`OrderReducer::apply_event`]
//! to reconstruct state.
//!
//! The reducer's `State` is [`OrdersState`], a map of every order known to
//! this process keyed by `OrderId` (one event stream per order), so a single
//! `Store` can back the whole `/orders` surface rather than one order per
//! process.

use crate::types::{Money, OrderAction, OrderId, OrderLineItem, OrderState, OrderStatus, OrdersState};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_core::reducer::Reducer;
use composable_rust_core::stream::{StreamId, Version};
use composable_rust_core::{append_events, publish_event};
use std::sync::Arc;

/// Topic an order event is published to, following the `{domain}.{entity}.{verb}`
/// convention (e.g. `ecommerce.order.confirmed`).
fn topic_for(action: &OrderAction) -> Option<&'static str> {
    match action {
        OrderAction::OrderCreated { .. } => Some("ecommerce.order.confirmed"),
        OrderAction::OrderStatusChanged { .. } | OrderAction::OrderPaid { .. } => {
            Some("ecommerce.order.status_changed")
        },
        OrderAction::OrderCanceled { .. } => Some("ecommerce.order.canceled"),
        _ => None,
    }
}

/// Environment for order processing: the event store and bus for persistence
/// and publication, plus a clock for deterministic timestamps.
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Event store for persisting order events.
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for publishing order events to downstream consumers.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for generating timestamps.
    pub clock: Arc<dyn Clock>,
}

impl OrderEnvironment {
    /// Creates a new order environment.
    #[must_use]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            event_store,
            event_bus,
            clock,
        }
    }
}

/// Reducer implementing the order aggregate's business logic.
///
/// Follows the event sourcing pattern: commands are validated against
/// current state, valid commands produce events, events are persisted and
/// published, and events are applied to update state.
#[derive(Clone, Default)]
pub struct OrderReducer;

impl OrderReducer {
    /// Creates a new order reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies an event to a single order's state, for event replay.
    ///
    /// Deterministic and idempotent: running this over the same event
    /// stream always produces the same state.
    fn apply_event_to_order(order: &mut OrderState, action: &OrderAction) {
        match action {
            OrderAction::OrderCreated {
                order_id,
                user_id,
                items,
                subtotal,
                discount,
                shipping,
                total,
                currency,
                shipping_address,
                checkout_session_id,
                ..
            } => {
                order.order_id = Some(order_id.clone());
                order.user_id = Some(user_id.clone());
                order.items.clone_from(items);
                order.subtotal = *subtotal;
                order.discount = *discount;
                order.shipping = *shipping;
                order.total = *total;
                order.currency.clone_from(currency);
                order.shipping_address = Some(shipping_address.clone());
                order.checkout_session_id.clone_from(checkout_session_id);
                order.status = OrderStatus::Pending;
            },
            OrderAction::OrderStatusChanged { to, .. } => {
                order.status = *to;
            },
            OrderAction::OrderConfirmed { .. } => {
                order.status = OrderStatus::Confirmed;
            },
            OrderAction::OrderCanceled { reason, .. } => {
                order.status = OrderStatus::Canceled;
                order.last_error = Some(reason.clone());
            },
            OrderAction::OrderPaid { payment_id, .. } => {
                order.payment_id = Some(payment_id.clone());
                order.status = OrderStatus::Paid;
            },
            OrderAction::ValidationFailed { error } => {
                order.last_error = Some(error.clone());
            },
            // Commands don't modify state directly; they are validated and
            // turned into events, which are applied above.
            OrderAction::CreateOrder { .. }
            | OrderAction::UpdateStatus { .. }
            | OrderAction::CancelOrder { .. }
            | OrderAction::MarkPaid { .. } => {},
        }
    }

    /// Applies an event to the orders map, creating the entry if this is the
    /// first event in the order's stream.
    fn apply_event(state: &mut OrdersState, order_id: &OrderId, action: &OrderAction) {
        let order = state
            .orders
            .entry(order_id.clone())
            .or_insert_with(OrderState::new);
        Self::apply_event_to_order(order, action);
    }

    fn validate_create_order(
        existing: Option<&OrderState>,
        items: &[OrderLineItem],
    ) -> Result<(), String> {
        if existing.is_some_and(OrderState::exists) {
            return Err("order already exists".to_string());
        }

        if items.is_empty() {
            return Err("order must contain at least one item".to_string());
        }

        for item in items {
            if item.quantity == 0 {
                return Err(format!("item '{}' has zero quantity", item.name));
            }
            if item.unit_price.cents() <= 0 {
                return Err(format!("item '{}' has invalid price", item.name));
            }
        }

        Ok(())
    }

    fn validate_status_update(
        existing: Option<&OrderState>,
        target: OrderStatus,
    ) -> Result<&OrderState, String> {
        let order = existing
            .filter(|o| o.exists())
            .ok_or_else(|| "order not found".to_string())?;

        if !order.status.can_transition_to(target) {
            return Err(format!(
                "order in status '{}' cannot transition to '{target}'",
                order.status
            ));
        }

        Ok(order)
    }

    fn calculate_total(subtotal: Money, discount: Money, shipping: Money) -> Money {
        subtotal - discount + shipping
    }

    fn serialize_event(action: &OrderAction) -> Result<SerializedEvent, String> {
        let event_type = action.event_type().to_string();
        let data =
            bincode::serialize(action).map_err(|e| format!("failed to serialize event: {e}"))?;
        Ok(SerializedEvent::new(event_type, data, None))
    }

    /// Builds the effect(s) that persist `event` to the event store and, if
    /// the event has a published topic, publish it to the event bus. Publish
    /// happens best-effort after the append succeeds: a publish failure is
    /// logged but does not roll back the append (no transactional outbox).
    fn create_persist_effects(
        env: &OrderEnvironment,
        stream_id: StreamId,
        expected_version: Option<Version>,
        event: OrderAction,
    ) -> Vec<Effect<OrderAction>> {
        let serialized_event = match Self::serialize_event(&event) {
            Ok(e) => e,
            Err(error) => {
                tracing::error!("failed to serialize order event: {error}");
                return vec![validation_failed_effect(error)];
            },
        };

        let event_store = Arc::clone(&env.event_store);
        let event_bus = Arc::clone(&env.event_bus);
        let topic = topic_for(&event);
        let persisted_event = event.clone();

        let append_effect = append_events! {
            store: event_store,
            stream: stream_id.as_str(),
            expected_version: expected_version,
            events: vec![serialized_event.clone()],
            on_success: |_version| Some(persisted_event),
            on_error: |error| Some(OrderAction::ValidationFailed {
                error: error.to_string(),
            })
        };

        let Some(topic) = topic else {
            return vec![append_effect];
        };

        let publish_effect = publish_event! {
            bus: event_bus,
            topic: topic,
            event: serialized_event,
            on_success: || None,
            on_error: |error| {
                tracing::warn!("failed to publish order event to {topic}: {error}");
                None
            }
        };

        vec![Effect::Sequential(vec![append_effect, publish_effect])]
    }
}

/// Wraps a validation error as a feedback action, routed through
/// `Effect::Future` so it flows through the same dispatch path as any other
/// outcome (observable via `Store::subscribe_actions`/`send_and_wait_for`).
fn validation_failed_effect(error: String) -> Effect<OrderAction> {
    Effect::Future(Box::pin(
        async move { Some(OrderAction::ValidationFailed { error }) },
    ))
}

fn stream_id_for(order_id: &OrderId) -> StreamId {
    StreamId::new(format!("order-{}", order_id.as_str()))
}

impl Reducer for OrderReducer {
    type State = OrdersState;
    type Action = OrderAction;
    type Environment = OrderEnvironment;

    #[allow(clippy::cognitive_complexity)]
    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            // ========== Commands ==========
            OrderAction::CreateOrder {
                order_id,
                user_id,
                items,
                subtotal,
                discount,
                shipping,
                currency,
                shipping_address,
                checkout_session_id,
            } => {
                let existing = state.orders.get(&order_id);
                if let Err(error) = Self::validate_create_order(existing, &items) {
                    tracing::warn!("CreateOrder validation failed: {error}");
                    return vec![validation_failed_effect(error)];
                }

                let total = Self::calculate_total(subtotal, discount, shipping);
                let event = OrderAction::OrderCreated {
                    order_id: order_id.clone(),
                    user_id,
                    items,
                    subtotal,
                    discount,
                    shipping,
                    total,
                    currency,
                    shipping_address,
                    checkout_session_id,
                    timestamp: env.clock.now(),
                };

                let stream_id = stream_id_for(&order_id);
                let expected_version = existing.and_then(|o| o.version);
                Self::create_persist_effects(env, stream_id, expected_version, event)
            },

            OrderAction::UpdateStatus { order_id, status } => {
                let existing = state.orders.get(&order_id);
                let order = match Self::validate_status_update(existing, status) {
                    Ok(order) => order,
                    Err(error) => {
                        tracing::warn!("UpdateStatus validation failed: {error}");
                        return vec![validation_failed_effect(error)];
                    },
                };

                let from = order.status;
                let expected_version = order.version;
                let event = OrderAction::OrderStatusChanged {
                    order_id: order_id.clone(),
                    from,
                    to: status,
                    timestamp: env.clock.now(),
                };

                let stream_id = stream_id_for(&order_id);
                Self::create_persist_effects(env, stream_id, expected_version, event)
            },

            OrderAction::CancelOrder { order_id, reason } => {
                let existing = state.orders.get(&order_id);
                let order = match Self::validate_status_update(existing, OrderStatus::Canceled) {
                    Ok(order) => order,
                    Err(error) => {
                        tracing::warn!("CancelOrder validation failed: {error}");
                        return vec![validation_failed_effect(error)];
                    },
                };

                let expected_version = order.version;
                let event = OrderAction::OrderCanceled {
                    order_id: order_id.clone(),
                    reason,
                    checkout_session_id: order.checkout_session_id.clone(),
                    timestamp: env.clock.now(),
                };

                let stream_id = stream_id_for(&order_id);
                Self::create_persist_effects(env, stream_id, expected_version, event)
            },

            OrderAction::MarkPaid {
                order_id,
                payment_id,
            } => {
                let existing = state.orders.get(&order_id);
                let order = match Self::validate_status_update(existing, OrderStatus::Paid) {
                    Ok(order) => order,
                    Err(error) => {
                        tracing::warn!("MarkPaid validation failed: {error}");
                        return vec![validation_failed_effect(error)];
                    },
                };

                let expected_version = order.version;
                let event = OrderAction::OrderPaid {
                    order_id: order_id.clone(),
                    payment_id,
                    timestamp: env.clock.now(),
                };

                let stream_id = stream_id_for(&order_id);
                Self::create_persist_effects(env, stream_id, expected_version, event)
            },

            // ========== Events (replay / feedback) ==========
            OrderAction::OrderCreated { ref order_id, .. }
            | OrderAction::OrderStatusChanged { ref order_id, .. }
            | OrderAction::OrderConfirmed { ref order_id, .. }
            | OrderAction::OrderCanceled { ref order_id, .. }
            | OrderAction::OrderPaid { ref order_id, .. } => {
                let order_id = order_id.clone();
                Self::apply_event(state, &order_id, &action);
                if let Some(order) = state.orders.get_mut(&order_id) {
                    order.version = Some(
                        order
                            .version
                            .map_or(Version::INITIAL, Version::next),
                    );
                }
                vec![Effect::None]
            },

            OrderAction::ValidationFailed { .. } => {
                // No order_id carried on validation failure; nothing to apply
                // to a specific order's state. Observed via the broadcast feed.
                vec![Effect::None]
            },
        }
    }
}
