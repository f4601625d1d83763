//! Core domain types for the inventory aggregate: stock levels per
//! (product, variant, warehouse) and the time-boxed reservations that hold
//! stock during checkout.
//!
//! A reservation's lifecycle is `active -> {confirmed, released, expired}`,
//! with the latter three terminal. Reservations are created in batches keyed
//! by `checkout_id`: one row per line item, confirmed or released together.

use chrono::{DateTime, Utc};
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifies a single stock row: a product variant in a warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if the product has variants.
    pub variant_id: Option<String>,
    /// Warehouse identifier.
    pub warehouse_id: String,
}

impl StockKey {
    /// Creates a new stock key.
    #[must_use]
    pub const fn new(product_id: String, variant_id: Option<String>, warehouse_id: String) -> Self {
        Self {
            product_id,
            variant_id,
            warehouse_id,
        }
    }
}

/// The warehouse used when a request doesn't name one. Checkout never
/// selects a warehouse explicitly, so every reservation goes through here.
pub const DEFAULT_WAREHOUSE: &str = "default";

/// Unique identifier for a reservation row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(String);

impl ReservationId {
    /// Creates a `ReservationId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `ReservationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("reservation-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stock on hand for one (product, variant, warehouse).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockRecord {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Warehouse identifier.
    pub warehouse_id: String,
    /// Quantity physically on hand.
    pub quantity: i64,
    /// Quantity held by active reservations.
    pub reserved: i64,
    /// Threshold below which a `inventory.low_stock` event fires.
    pub low_stock_threshold: i64,
    /// Last time this row changed.
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Creates a fresh stock row with zero quantity.
    #[must_use]
    pub fn new(key: &StockKey, low_stock_threshold: i64, now: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            warehouse_id: key.warehouse_id.clone(),
            quantity: 0,
            reserved: 0,
            low_stock_threshold,
            updated_at: now,
        }
    }

    /// Quantity available to reserve: `max(0, quantity - reserved)`.
    #[must_use]
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }

    /// Whether available stock has dropped below the low-stock threshold.
    #[must_use]
    pub fn is_low(&self) -> bool {
        self.available() < self.low_stock_threshold
    }
}

/// Status of a stock reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Holding stock, counted against `reserved`.
    Active,
    /// Finalized by an order confirmation; stock physically decremented.
    Confirmed,
    /// Released back to available stock, explicitly or by compensation.
    Released,
    /// Released back to available stock by the expiry sweeper.
    Expired,
}

impl ReservationStatus {
    /// Terminal statuses no longer hold stock.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A single reserved line: one product/variant/quantity held for one
/// checkout, until confirmed into a physical decrement or released.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockReservation {
    /// Reservation identifier.
    pub id: ReservationId,
    /// Checkout session this reservation was made for. Correlates
    /// confirm/release back to the reservation set.
    pub checkout_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Warehouse the stock is held in.
    pub warehouse_id: String,
    /// Quantity held.
    pub quantity: i64,
    /// Current status.
    pub status: ReservationStatus,
    /// When this reservation expires if never confirmed or released.
    pub expires_at: DateTime<Utc>,
    /// When this reservation was created.
    pub created_at: DateTime<Utc>,
}

impl StockReservation {
    #[must_use]
    pub(crate) fn stock_key(&self) -> StockKey {
        StockKey::new(
            self.product_id.clone(),
            self.variant_id.clone(),
            self.warehouse_id.clone(),
        )
    }
}

/// A line item in a `Reserve` request: a product/variant/quantity to hold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReservationLineRequest {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Quantity requested.
    pub quantity: i64,
}

/// An audit record of a stock-quantity change, for traceability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockMovement {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Warehouse identifier.
    pub warehouse_id: String,
    /// Signed change in quantity.
    pub delta: i64,
    /// Why the quantity changed (e.g. `"order"`, `"restock"`, `"correction"`).
    pub reason: String,
    /// External reference (e.g. a checkout id or PO number).
    pub reference: String,
    /// When the movement occurred.
    pub timestamp: DateTime<Utc>,
}

/// Aggregate state for the whole inventory service: every stock row and
/// every reservation this process knows about, replayed from its event
/// stream.
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct InventoryState {
    /// Stock rows, indexed by (product, variant, warehouse).
    pub stock: HashMap<StockKey, StockRecord>,
    /// Reservations, indexed by reservation id.
    pub reservations: HashMap<ReservationId, StockReservation>,
    /// Audit trail of quantity changes.
    pub movements: Vec<StockMovement>,
}

impl InventoryState {
    /// Creates empty inventory state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stock row for a key, if known.
    #[must_use]
    pub fn stock_for(&self, key: &StockKey) -> Option<&StockRecord> {
        self.stock.get(key)
    }

    /// Returns every reservation made for a checkout session.
    #[must_use]
    pub fn reservations_for_checkout(&self, checkout_id: &str) -> Vec<&StockReservation> {
        self.reservations
            .values()
            .filter(|r| r.checkout_id == checkout_id)
            .collect()
    }

    /// Returns every active reservation whose expiry has passed.
    #[must_use]
    pub fn expired_active_reservations(&self, now: DateTime<Utc>) -> Vec<ReservationId> {
        self.reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .map(|r| r.id.clone())
            .collect()
    }
}

/// Commands and events for the inventory aggregate.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum InventoryAction {
    // ========== Commands ==========
    /// Command: reserve stock for a checkout's line items, all-or-nothing.
    #[command]
    Reserve {
        /// Checkout session requesting the hold.
        checkout_id: String,
        /// Line items to reserve.
        items: Vec<ReservationLineRequest>,
        /// How long the reservation is held before the sweeper expires it.
        ttl_seconds: i64,
    },

    /// Command: finalize every active reservation for a checkout into a
    /// physical stock decrement. Driven by consuming `order.confirmed`.
    #[command]
    ConfirmReservations {
        /// Checkout session whose reservations should be confirmed.
        checkout_id: String,
    },

    /// Command: release every active reservation for a checkout back to
    /// available stock. Driven either by an explicit internal HTTP call
    /// during saga compensation, or by consuming `order.canceled`.
    #[command]
    ReleaseReservations {
        /// Checkout session whose reservations should be released.
        checkout_id: String,
    },

    /// Command: adjust a stock row's quantity by a signed delta (restock,
    /// correction, shrinkage). Creates the row if it doesn't exist yet.
    #[command]
    Adjust {
        /// Product identifier.
        product_id: String,
        /// Variant identifier, if any.
        variant_id: Option<String>,
        /// Warehouse identifier.
        warehouse_id: String,
        /// Signed change in quantity.
        delta: i64,
        /// Reason for the change.
        reason: String,
        /// External reference.
        reference: String,
    },

    /// Command: sweep active reservations past their expiry and release
    /// them. Issued on a timer, not by any caller.
    #[command]
    SweepExpired {
        /// Current time, supplied by the sweeper so the check is
        /// deterministic and testable.
        now: DateTime<Utc>,
    },

    // ========== Events ==========
    /// Event: one line of a `Reserve` request was held successfully.
    #[event]
    StockReserved {
        /// Reservation created.
        reservation_id: ReservationId,
        /// Checkout session this reservation belongs to.
        checkout_id: String,
        /// Product identifier.
        product_id: String,
        /// Variant identifier, if any.
        variant_id: Option<String>,
        /// Warehouse identifier.
        warehouse_id: String,
        /// Quantity reserved.
        quantity: i64,
        /// When the hold expires.
        expires_at: DateTime<Utc>,
    },

    /// Event: a stock row's quantity or reservation count changed.
    #[event]
    StockUpdated {
        /// Product identifier.
        product_id: String,
        /// Variant identifier, if any.
        variant_id: Option<String>,
        /// Warehouse identifier.
        warehouse_id: String,
        /// Quantity on hand after the change.
        quantity: i64,
        /// Quantity reserved after the change.
        reserved: i64,
        /// Quantity available after the change.
        available: i64,
    },

    /// Event: a stock row dropped below its low-stock threshold.
    #[event]
    LowStock {
        /// Product identifier.
        product_id: String,
        /// Variant identifier, if any.
        variant_id: Option<String>,
        /// Warehouse identifier.
        warehouse_id: String,
        /// Quantity available.
        available: i64,
        /// The configured threshold that was crossed.
        threshold: i64,
    },

    /// Event: a reservation was finalized into a physical decrement.
    #[event]
    ReservationConfirmed {
        /// Reservation identifier.
        reservation_id: ReservationId,
        /// Checkout session this reservation belongs to.
        checkout_id: String,
        /// Quantity decremented from on-hand stock.
        quantity: i64,
    },

    /// Event: a reservation was released back to available stock.
    #[event]
    ReservationReleased {
        /// Reservation identifier.
        reservation_id: ReservationId,
        /// Checkout session this reservation belongs to.
        checkout_id: String,
        /// Quantity returned to available stock.
        quantity: i64,
    },

    /// Event: a stock row's quantity was manually adjusted.
    #[event]
    StockAdjusted {
        /// Product identifier.
        product_id: String,
        /// Variant identifier, if any.
        variant_id: Option<String>,
        /// Warehouse identifier.
        warehouse_id: String,
        /// Signed change applied.
        delta: i64,
        /// Reason for the change.
        reason: String,
        /// External reference.
        reference: String,
        /// Quantity on hand after the change.
        quantity_after: i64,
    },

    /// Event: command validation failed (insufficient stock, unknown
    /// checkout, etc).
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

    fn key() -> StockKey {
        StockKey::new("widget".to_string(), None, DEFAULT_WAREHOUSE.to_string())
    }

    #[test]
    fn stock_record_available_never_goes_negative() {
        let mut record = StockRecord::new(&key(), 5, Utc::now());
        record.quantity = 3;
        record.reserved = 10;
        assert_eq!(record.available(), 0);
    }

    #[test]
    fn stock_record_is_low_compares_available_not_quantity() {
        let mut record = StockRecord::new(&key(), 5, Utc::now());
        record.quantity = 10;
        record.reserved = 8;
        assert!(record.is_low());
    }

    #[test]
    fn reservation_status_terminal_excludes_only_active() {
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Released.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn reservations_for_checkout_filters_by_id() {
        let mut state = InventoryState::new();
        let now = Utc::now();
        let reservation = StockReservation {
            id: ReservationId::generate(),
            checkout_id: "checkout-1".to_string(),
            product_id: "widget".to_string(),
            variant_id: None,
            warehouse_id: DEFAULT_WAREHOUSE.to_string(),
            quantity: 2,
            status: ReservationStatus::Active,
            expires_at: now + chrono::Duration::minutes(15),
            created_at: now,
        };
        state.reservations.insert(reservation.id.clone(), reservation);

        assert_eq!(state.reservations_for_checkout("checkout-1").len(), 1);
        assert!(state.reservations_for_checkout("checkout-2").is_empty());
    }

    #[test]
    fn expired_active_reservations_excludes_terminal_and_unexpired() {
        let mut state = InventoryState::new();
        let now = Utc::now();

        let expired = StockReservation {
            id: ReservationId::generate(),
            checkout_id: "checkout-1".to_string(),
            product_id: "widget".to_string(),
            variant_id: None,
            warehouse_id: DEFAULT_WAREHOUSE.to_string(),
            quantity: 2,
            status: ReservationStatus::Active,
            expires_at: now - chrono::Duration::minutes(1),
            created_at: now - chrono::Duration::minutes(20),
        };
        let not_yet = StockReservation {
            expires_at: now + chrono::Duration::minutes(10),
            ..expired.clone()
        };
        let already_released = StockReservation {
            id: ReservationId::generate(),
            status: ReservationStatus::Released,
            ..expired.clone()
        };

        state.reservations.insert(expired.id.clone(), expired.clone());
        state.reservations.insert(ReservationId::generate(), not_yet);
        state.reservations.insert(already_released.id.clone(), already_released);

        let due = state.expired_active_reservations(now);
        assert_eq!(due, vec![expired.id]);
    }

    #[test]
    fn inventory_action_tags_commands_and_events() {
        assert!(InventoryAction::Reserve {
            checkout_id: "c".to_string(),
            items: vec![],
            ttl_seconds: 900,
        }
        .is_command());
        assert!(InventoryAction::StockReserved {
            reservation_id: ReservationId::generate(),
            checkout_id: "c".to_string(),
            product_id: "widget".to_string(),
            variant_id: None,
            warehouse_id: DEFAULT_WAREHOUSE.to_string(),
            quantity: 1,
            expires_at: Utc::now(),
        }
        .is_event());
    }
}
