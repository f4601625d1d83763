//! Core domain types for the checkout saga.
//!
//! A checkout session drives a purchase through a fixed sequence of remote
//! calls (reserve inventory, compute discount, initiate payment, create
//! order, finalize), each with a defined compensation, so that either the
//! order exists and every resource is committed, or every side effect is
//! undone.

use chrono::{DateTime, Duration, Utc};
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a `SessionId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("checkout-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user running a checkout.
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

/// Money amount in minor currency units (cents).
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

/// A line item in a checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if the product has variants.
    pub variant_id: Option<String>,
    /// Quantity requested.
    pub quantity: u32,
    /// Price per unit in cents, as quoted to the buyer.
    pub unit_price: Money,
}

impl CheckoutItem {
    /// Total price for this line item.
    #[must_use]
    pub const fn total(&self) -> Money {
        Money(self.unit_price.0 * self.quantity as i64)
    }
}

/// Shipping address attached to a checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient name.
    pub name: String,
    /// Street address, line 1.
    pub line1: String,
    /// Street address, line 2.
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

/// Status of a checkout session.
///
/// Terminal statuses are `Completed`, `Failed`, `Expired`. A session past
/// its `expires_at` is treated as expired regardless of its recorded status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Session created, no saga step executed yet.
    Initiated,
    /// Inventory has been reserved.
    ItemsReserved,
    /// Payment has been initiated and is awaiting a synchronous result.
    PaymentPending,
    /// Payment provider returned "processing"; awaiting a webhook.
    PaymentProcessing,
    /// Every step succeeded; the order was created.
    Completed,
    /// A step failed and compensation ran (or is still running).
    Failed,
    /// The session's TTL elapsed before completion.
    Expired,
}

impl CheckoutStatus {
    /// Whether this status is terminal (no further `process` calls act on it).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

impl fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::ItemsReserved => "items_reserved",
            Self::PaymentPending => "payment_pending",
            Self::PaymentProcessing => "payment_processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one execution of a saga step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStepStatus {
    /// Not yet attempted.
    Pending,
    /// Succeeded.
    Completed,
    /// Attempted and failed.
    Failed,
    /// A prior success was undone by compensation.
    Compensated,
}

/// One entry in a session's saga step log. `saga_steps` is append-only per
/// execution pass: a step is attempted at most once per `process` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaStep {
    /// Step name (`reserve_inventory`, `compute_discount`, `initiate_payment`,
    /// `create_order`, `finalize`).
    pub name: String,
    /// Outcome of this step.
    pub status: SagaStepStatus,
    /// When the step was executed.
    pub executed_at: DateTime<Utc>,
    /// Error message, if the step failed.
    pub error: Option<String>,
}

/// A checkout session: the saga's unit of coordination. Held purely
/// in-memory by the reducer's `Store`, keyed by `SessionId` — the saga has
/// no database of its own (see [`CheckoutSessionsState`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session identifier.
    pub id: SessionId,
    /// User running this checkout.
    pub user_id: UserId,
    /// Items being purchased.
    pub items: Vec<CheckoutItem>,
    /// Subtotal before discount and shipping.
    pub subtotal: Money,
    /// Discount applied by the campaign service.
    pub discount: Money,
    /// Shipping cost.
    pub shipping: Money,
    /// Grand total.
    pub total: Money,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Current status.
    pub status: CheckoutStatus,
    /// Append-only log of saga step executions.
    pub saga_steps: Vec<SagaStep>,
    /// Shipping address, once attached.
    pub shipping_address: Option<ShippingAddress>,
    /// Payment method, once attached.
    pub payment_method: Option<String>,
    /// Inventory reservation id, once reserved.
    pub reservation_id: Option<String>,
    /// Payment id, once a payment has been initiated.
    pub payment_id: Option<String>,
    /// Order id, once the order has been created.
    pub order_id: Option<String>,
    /// Root cause, once the session has failed.
    pub failure_reason: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session expires if not completed.
    pub expires_at: DateTime<Utc>,
}

/// Default session TTL: 30 minutes.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

impl CheckoutSession {
    /// Creates a new session in `initiated`, with the default TTL.
    #[must_use]
    pub fn new(
        id: SessionId,
        user_id: UserId,
        items: Vec<CheckoutItem>,
        currency: String,
        now: DateTime<Utc>,
    ) -> Self {
        let subtotal = items
            .iter()
            .fold(Money::from_cents(0), |acc, item| acc + item.total());

        Self {
            id,
            user_id,
            items,
            subtotal,
            discount: Money::from_cents(0),
            shipping: Money::from_cents(0),
            total: subtotal,
            currency,
            status: CheckoutStatus::Initiated,
            saga_steps: Vec::new(),
            shipping_address: None,
            payment_method: None,
            reservation_id: None,
            payment_id: None,
            order_id: None,
            failure_reason: None,
            created_at: now,
            expires_at: now + Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    /// Whether `now` is past this session's `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Appends a step outcome to the saga log.
    pub fn record_step(&mut self, name: &str, status: SagaStepStatus, now: DateTime<Utc>, error: Option<String>) {
        self.saga_steps.push(SagaStep {
            name: name.to_string(),
            status,
            executed_at: now,
            error,
        });
    }

    /// Recomputes `total` from `subtotal`, `discount`, `shipping`.
    pub fn recompute_total(&mut self) {
        self.total = self.subtotal - self.discount + self.shipping;
    }
}

/// Reducer state for the checkout service: every in-flight or recently
/// finished session, indexed by `SessionId`. The saga holds no database of
/// its own; this map is the entirety of its persistence, matching the
/// recommendation that session state live behind the session id as a single
/// coordinator lock (one session, one entry, one in-flight `process` call).
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutSessionsState {
    /// Sessions indexed by id.
    pub sessions: HashMap<SessionId, CheckoutSession>,
    /// Sessions currently executing a `process` step, to reject a second
    /// concurrent `process` call with 409.
    pub processing: std::collections::HashSet<SessionId>,
}

impl CheckoutSessionsState {
    /// Creates an empty sessions state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            processing: std::collections::HashSet::new(),
        }
    }

    /// Returns the session with the given id, if it exists.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<&CheckoutSession> {
        self.sessions.get(id)
    }
}

/// Commands and events for the checkout saga.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum CheckoutAction {
    // ========== Commands ==========
    /// Command: create a new checkout session.
    #[command]
    InitiateCheckout {
        /// Session identifier assigned by the caller.
        session_id: SessionId,
        /// User running this checkout.
        user_id: UserId,
        /// Items being purchased.
        items: Vec<CheckoutItem>,
        /// ISO-4217 currency code.
        currency: String,
    },

    /// Command: attach a shipping address to a session.
    #[command]
    AttachShipping {
        /// Session to update.
        session_id: SessionId,
        /// Shipping address.
        address: ShippingAddress,
    },

    /// Command: attach a payment method to a session.
    #[command]
    AttachPayment {
        /// Session to update.
        session_id: SessionId,
        /// Payment method token/identifier.
        method: String,
    },

    /// Command: execute the next saga step(s) for a session.
    #[command]
    Process {
        /// Session to advance.
        session_id: SessionId,
    },

    /// Command: explicitly abort a non-terminal session.
    #[command]
    CancelSession {
        /// Session to cancel.
        session_id: SessionId,
    },

    // ========== Saga progression (internal feedback) ==========
    /// Event: inventory was reserved for this session.
    #[event]
    InventoryReserved {
        /// Session identifier.
        session_id: SessionId,
        /// Reservation id returned by the inventory service.
        reservation_id: String,
    },

    /// Event: inventory reservation failed (insufficient stock).
    #[event]
    InventoryReservationFailed {
        /// Session identifier.
        session_id: SessionId,
        /// Error message.
        error: String,
    },

    /// Event: a discount was computed (possibly zero, on a non-blocking failure).
    #[event]
    DiscountComputed {
        /// Session identifier.
        session_id: SessionId,
        /// Discount amount in cents.
        discount_cents: i64,
    },

    /// Event: the payment provider returned a synchronous result.
    #[event]
    PaymentInitiated {
        /// Session identifier.
        session_id: SessionId,
        /// Payment id assigned by the provider.
        payment_id: String,
        /// Result: `success`, `processing`, or `failed`.
        result: String,
    },

    /// Event: an async payment webhook resolved a pending payment.
    #[event]
    PaymentSettled {
        /// Session identifier.
        session_id: SessionId,
        /// Whether the payment succeeded.
        succeeded: bool,
    },

    /// Event: the order service materialized the order.
    #[event]
    OrderCreated {
        /// Session identifier.
        session_id: SessionId,
        /// Order id assigned by the order service.
        order_id: String,
    },

    /// Event: the order service failed to create the order.
    #[event]
    OrderCreationFailed {
        /// Session identifier.
        session_id: SessionId,
        /// Error message.
        error: String,
    },

    /// Event: the session finished successfully.
    #[event]
    SessionCompleted {
        /// Session identifier.
        session_id: SessionId,
    },

    /// Event: the session failed (compensation, if any, already ran).
    #[event]
    SessionFailed {
        /// Session identifier.
        session_id: SessionId,
        /// Root cause.
        reason: String,
    },

    /// Event: compensation for payment (refund/cancel) finished.
    #[event]
    PaymentCompensated {
        /// Session identifier.
        session_id: SessionId,
    },

    /// Event: compensation for inventory (release) finished.
    #[event]
    InventoryCompensated {
        /// Session identifier.
        session_id: SessionId,
    },

    /// Event: compensation for the order (cancel) finished.
    #[event]
    OrderCompensated {
        /// Session identifier.
        session_id: SessionId,
    },

    /// Event: a command was rejected (validation, ownership, or concurrency).
    #[event]
    ValidationFailed {
        /// Error message.
        error: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn item(cents: i64, quantity: u32) -> CheckoutItem {
        CheckoutItem {
            product_id: "prod-1".to_string(),
            variant_id: None,
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    #[test]
    fn session_id_generate_has_prefix() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("checkout-"));
    }

    #[test]
    fn checkout_item_total_multiplies_unit_price_by_quantity() {
        assert_eq!(item(500, 3).total(), Money::from_cents(1500));
    }

    #[test]
    fn new_session_computes_subtotal_and_expiry() {
        let now = Utc::now();
        let session = CheckoutSession::new(
            SessionId::new("s-1".to_string()),
            UserId::new("user-1".to_string()),
            vec![item(1000, 2), item(500, 1)],
            "USD".to_string(),
            now,
        );

        assert_eq!(session.subtotal, Money::from_cents(2500));
        assert_eq!(session.total, Money::from_cents(2500));
        assert_eq!(session.status, CheckoutStatus::Initiated);
        assert_eq!(session.expires_at, now + Duration::minutes(DEFAULT_SESSION_TTL_MINUTES));
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::minutes(DEFAULT_SESSION_TTL_MINUTES + 1)));
    }

    #[test]
    fn recompute_total_applies_discount_and_shipping() {
        let now = Utc::now();
        let mut session = CheckoutSession::new(
            SessionId::new("s-1".to_string()),
            UserId::new("user-1".to_string()),
            vec![item(1000, 1)],
            "USD".to_string(),
            now,
        );
        session.discount = Money::from_cents(200);
        session.shipping = Money::from_cents(300);
        session.recompute_total();

        assert_eq!(session.total, Money::from_cents(1100));
    }

    #[test]
    fn record_step_appends_to_log() {
        let now = Utc::now();
        let mut session = CheckoutSession::new(
            SessionId::new("s-1".to_string()),
            UserId::new("user-1".to_string()),
            vec![item(1000, 1)],
            "USD".to_string(),
            now,
        );
        session.record_step("reserve_inventory", SagaStepStatus::Completed, now, None);
        assert_eq!(session.saga_steps.len(), 1);
        assert_eq!(session.saga_steps[0].name, "reserve_inventory");
    }

    #[test]
    fn terminal_statuses_are_exactly_completed_failed_expired() {
        assert!(CheckoutStatus::Completed.is_terminal());
        assert!(CheckoutStatus::Failed.is_terminal());
        assert!(CheckoutStatus::Expired.is_terminal());
        assert!(!CheckoutStatus::Initiated.is_terminal());
        assert!(!CheckoutStatus::ItemsReserved.is_terminal());
        assert!(!CheckoutStatus::PaymentPending.is_terminal());
        assert!(!CheckoutStatus::PaymentProcessing.is_terminal());
    }

    #[test]
    fn sessions_state_get_returns_none_for_unknown_id() {
        let state = CheckoutSessionsState::new();
        assert!(state.get(&SessionId::new("missing".to_string())).is_none());
    }

    #[test]
    fn checkout_action_tags_commands_and_events() {
        let command = CheckoutAction::Process {
            session_id: SessionId::new("s-1".to_string()),
        };
        assert!(command.is_command());
        assert!(!command.is_event());

        let event = CheckoutAction::SessionCompleted {
            session_id: SessionId::new("s-1".to_string()),
        };
        assert!(event.is_event());
        assert!(!event.is_command());
    }
}
