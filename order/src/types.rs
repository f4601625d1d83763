//! Core domain types for the order aggregate.
//!
//! Orders progress through a forward-moving status state machine:
//! pending → confirmed → paid → shipped → delivered, with cancellation
//! reachable from {pending, confirmed, paid} and refund reachable from
//! {paid, shipped, delivered}.

use chrono::{DateTime, Utc};
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::stream::Version;
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Creates an `OrderId` from an existing string (e.g. a path parameter).
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `OrderId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("order-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user who placed an order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line item captured at the time the order was placed.
///
/// Items are a snapshot: later catalog/price changes never affect an
/// existing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if the product has variants.
    pub variant_id: Option<String>,
    /// Product name as displayed at order time.
    pub name: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Price per unit in minor currency units (e.g. cents), at order time.
    pub unit_price: Money,
}

impl OrderLineItem {
    /// Total price for this line item (`unit_price * quantity`).
    #[must_use]
    pub const fn total(&self) -> Money {
        Money(self.unit_price.0 * self.quantity as i64)
    }
}

/// Money amount in minor currency units (cents), to avoid floating point drift.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a money amount from minor units (cents).
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the value in minor units (cents).
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[allow(clippy::cast_precision_loss)]
        write!(f, "{:.2}", self.0 as f64 / 100.0)
    }
}

/// Shipping address captured on the order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient name.
    pub name: String,
    /// Street address, line 1.
    pub line1: String,
    /// Street address, line 2 (apartment, suite, etc).
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or province.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

/// Status of an order in its lifecycle.
///
/// Transitions are forward-only except for cancellation and refund:
/// `Canceled` is reachable only from `{Pending, Confirmed, Paid}`;
/// `Refunded` only from `{Paid, Shipped, Delivered}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order has been created from a completed checkout saga but not yet confirmed.
    Pending,
    /// Order has been confirmed (stock reservations finalized).
    Confirmed,
    /// Payment has settled.
    Paid,
    /// Order has shipped.
    Shipped,
    /// Order has been delivered.
    Delivered,
    /// Order was canceled before shipping.
    Canceled,
    /// Order was refunded after payment.
    Refunded,
}

impl OrderStatus {
    /// Whether `self -> target` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        use OrderStatus::{Canceled, Confirmed, Delivered, Paid, Pending, Refunded, Shipped};
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Confirmed, Paid)
                | (Paid, Shipped)
                | (Shipped, Delivered)
                | (Pending | Confirmed | Paid, Canceled)
                | (Paid | Shipped | Delivered, Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

/// State of a single order aggregate, derived by replaying its event stream.
///
/// Nested inside [`OrdersState`], which is the actual `Reducer::State` for
/// the order service (one event stream per order, keyed by `OrderId`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderState {
    /// Order identifier (`None` until the order is created).
    pub order_id: Option<OrderId>,
    /// User who placed the order.
    pub user_id: Option<UserId>,
    /// Line items, snapshotted at order time.
    pub items: Vec<OrderLineItem>,
    /// Subtotal before discount and shipping.
    pub subtotal: Money,
    /// Discount applied (from a campaign), if any.
    pub discount: Money,
    /// Shipping cost.
    pub shipping: Money,
    /// Grand total: `subtotal - discount + shipping`.
    pub total: Money,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Shipping address.
    pub shipping_address: Option<ShippingAddress>,
    /// Payment identifier, set once payment settles.
    pub payment_id: Option<String>,
    /// Current status.
    pub status: OrderStatus,
    /// Current version in the event stream (`None` for a brand new aggregate).
    pub version: Option<Version>,
    /// Last validation error, retained for observability.
    pub last_error: Option<String>,
    /// Checkout session this order was created from, if any. Lets event
    /// consumers (inventory, in particular) correlate `order.confirmed` and
    /// `order.canceled` back to the reservation they need to settle.
    pub checkout_session_id: Option<String>,
}

impl OrderState {
    /// Creates an empty order state (no order created yet).
    #[must_use]
    pub fn new() -> Self {
        Self {
            order_id: None,
            user_id: None,
            items: Vec::new(),
            subtotal: Money::from_cents(0),
            discount: Money::from_cents(0),
            shipping: Money::from_cents(0),
            total: Money::from_cents(0),
            currency: String::new(),
            shipping_address: None,
            payment_id: None,
            status: OrderStatus::Pending,
            version: None,
            last_error: None,
            checkout_session_id: None,
        }
    }

    /// Whether this aggregate has been created yet.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.order_id.is_some()
    }
}

impl Default for OrderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level state for the order service: every order known to this
/// process, indexed by `OrderId`.
///
/// Each order is its own event-sourced aggregate with its own stream and
/// version; `OrdersState` is the in-memory projection of all of them that
/// the reducer and HTTP handlers operate against.
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrdersState {
    /// All orders known to this process, indexed by ID.
    pub orders: std::collections::HashMap<OrderId, OrderState>,
}

impl OrdersState {
    /// Creates an empty orders state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: std::collections::HashMap::new(),
        }
    }

    /// Returns the order with the given ID, if it exists.
    #[must_use]
    pub fn get(&self, id: &OrderId) -> Option<&OrderState> {
        self.orders.get(id)
    }

    /// Returns every order placed by the given user.
    #[must_use]
    pub fn for_user<'a>(&'a self, user_id: &'a UserId) -> Vec<&'a OrderState> {
        self.orders
            .values()
            .filter(|order| order.user_id.as_ref() == Some(user_id))
            .collect()
    }
}

/// Commands and events for the order aggregate.
///
/// Commands express intent and are validated by the reducer; events record
/// what happened and are persisted to the event store and replayed to
/// reconstruct state.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum OrderAction {
    // ========== Commands ==========
    /// Command: create an order from a completed checkout saga snapshot.
    #[command]
    CreateOrder {
        /// Order identifier assigned by the caller (the checkout saga).
        order_id: OrderId,
        /// User who placed the order.
        user_id: UserId,
        /// Line items captured at checkout time.
        items: Vec<OrderLineItem>,
        /// Subtotal before discount and shipping.
        subtotal: Money,
        /// Discount applied.
        discount: Money,
        /// Shipping cost.
        shipping: Money,
        /// ISO-4217 currency code.
        currency: String,
        /// Shipping address.
        shipping_address: ShippingAddress,
        /// Checkout session this order originated from, if the caller is the
        /// checkout saga (as opposed to, say, a manual admin order).
        checkout_session_id: Option<String>,
    },

    /// Command: transition an order's status.
    #[command]
    UpdateStatus {
        /// Order to update.
        order_id: OrderId,
        /// Target status.
        status: OrderStatus,
    },

    /// Command: cancel an order.
    #[command]
    CancelOrder {
        /// Order to cancel.
        order_id: OrderId,
        /// Reason for cancellation.
        reason: String,
    },

    /// Command: record a settled payment against the order.
    #[command]
    MarkPaid {
        /// Order identifier.
        order_id: OrderId,
        /// Payment identifier.
        payment_id: String,
    },

    // ========== Events ==========
    /// Event: an order was created (pending, awaiting confirmation).
    #[event]
    OrderCreated {
        /// Order identifier.
        order_id: OrderId,
        /// User who placed the order.
        user_id: UserId,
        /// Line items.
        items: Vec<OrderLineItem>,
        /// Subtotal before discount and shipping.
        subtotal: Money,
        /// Discount applied.
        discount: Money,
        /// Shipping cost.
        shipping: Money,
        /// Grand total.
        total: Money,
        /// ISO-4217 currency code.
        currency: String,
        /// Shipping address.
        shipping_address: ShippingAddress,
        /// Checkout session this order originated from, if any.
        checkout_session_id: Option<String>,
        /// When the order was created.
        timestamp: DateTime<Utc>,
    },

    /// Event: an order's status changed.
    #[event]
    OrderStatusChanged {
        /// Order identifier.
        order_id: OrderId,
        /// Status before the change.
        from: OrderStatus,
        /// Status after the change.
        to: OrderStatus,
        /// When the change occurred.
        timestamp: DateTime<Utc>,
    },

    /// Event: an order was confirmed (stock reservations finalized).
    #[event]
    OrderConfirmed {
        /// Order identifier.
        order_id: OrderId,
        /// When the order was confirmed.
        timestamp: DateTime<Utc>,
    },

    /// Event: an order was canceled.
    #[event]
    OrderCanceled {
        /// Order identifier.
        order_id: OrderId,
        /// Reason for cancellation.
        reason: String,
        /// Checkout session this order originated from, if any.
        checkout_session_id: Option<String>,
        /// When the order was canceled.
        timestamp: DateTime<Utc>,
    },

    /// Event: payment settled for an order.
    #[event]
    OrderPaid {
        /// Order identifier.
        order_id: OrderId,
        /// Payment identifier.
        payment_id: String,
        /// When payment settled.
        timestamp: DateTime<Utc>,
    },

    /// Event: command validation failed.
    #[event]
    ValidationFailed {
        /// Error message.
        error: String,
    },
}

impl OrderAction {
    /// Deserializes an event from a serialized event, for replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the event data cannot be deserialized from
    /// bincode format.
    pub fn from_serialized(serialized: &SerializedEvent) -> Result<Self, String> {
        bincode::deserialize(&serialized.data)
            .map_err(|e| format!("failed to deserialize order event: {e}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn item() -> OrderLineItem {
        OrderLineItem {
            product_id: "prod-1".to_string(),
            variant_id: None,
            name: "Widget".to_string(),
            quantity: 2,
            unit_price: Money::from_cents(1000),
        }
    }

    #[test]
    fn line_item_total() {
        assert_eq!(item().total(), Money::from_cents(2000));
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
    }

    #[test]
    fn status_forward_transitions_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn status_skip_ahead_is_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn cancellation_only_from_pre_shipment_states() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Canceled));
    }

    #[test]
    fn refund_only_from_post_payment_states() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Refunded));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Confirmed));
    }

    #[test]
    fn order_action_event_type() {
        let action = OrderAction::OrderConfirmed {
            order_id: OrderId::new("order-1".to_string()),
            timestamp: Utc::now(),
        };
        assert_eq!(action.event_type(), "OrderConfirmed.v1");
        assert!(action.is_event());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let original = OrderAction::OrderCreated {
            order_id: OrderId::new("order-123".to_string()),
            user_id: UserId::new("user-456".to_string()),
            items: vec![item()],
            subtotal: Money::from_cents(2000),
            discount: Money::from_cents(0),
            shipping: Money::from_cents(500),
            total: Money::from_cents(2500),
            currency: "USD".to_string(),
            shipping_address: ShippingAddress {
                name: "Jess Doe".to_string(),
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62701".to_string(),
                country: "US".to_string(),
            },
            timestamp: Utc::now(),
        };

        let event_type = original.event_type().to_string();
        let data = bincode::serialize(&original).expect("serialize");
        let serialized = SerializedEvent::new(event_type, data, None);

        let deserialized = OrderAction::from_serialized(&serialized).expect("deserialize");
        assert_eq!(original.event_type(), deserialized.event_type());
        assert!(deserialized.is_event());
    }
}
