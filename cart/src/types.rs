//! Cart domain types.
//!
//! Unlike the event-sourced aggregates elsewhere in the platform, the cart
//! is plain mutable state living in a key/value store: there is no
//! `Reducer`, no event log, just a JSON blob per user guarded by an
//! optimistic version.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default time-to-live for a cart, refreshed on every successful write.
pub const CART_TTL: Duration = Duration::hours(24);

/// One line item in a cart. Unique per `(product_id, variant_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product this line refers to.
    pub product_id: String,
    /// Variant SKU within the product.
    pub variant_id: String,
    /// Display name, snapshotted at add-time.
    pub name: String,
    /// Stock-keeping unit, snapshotted at add-time.
    pub sku: String,
    /// Unit price in the smallest currency unit, snapshotted at add-time.
    pub unit_price_cents: i64,
    /// Quantity. Always >= 1; a line with quantity 0 is removed, never stored.
    pub quantity: u32,
    /// Thumbnail URL, snapshotted at add-time.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A user's cart as stored in the key/value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Owning user. Carts are never shared across users.
    pub user_id: String,
    /// Line items, de-duplicated by `(product_id, variant_id)`.
    pub items: Vec<CartItem>,
    /// ISO-4217 currency code. Fixed once the cart has its first item.
    pub currency: String,
    /// Monotone version, incremented by exactly one per accepted write.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent accepted write.
    pub updated_at: DateTime<Utc>,
    /// Expiration timestamp, pushed forward by `CART_TTL` on every write.
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    /// Build an empty cart for `user_id` at `version` 0, not yet persisted.
    pub fn empty(user_id: impl Into<String>, currency: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            items: Vec::new(),
            currency: currency.into(),
            version: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + CART_TTL,
        }
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of `unit_price_cents * quantity` across all lines.
    #[must_use]
    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(|item| item.unit_price_cents * i64::from(item.quantity)).sum()
    }

    fn find_line(&mut self, product_id: &str, variant_id: &str) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|item| item.product_id == product_id && item.variant_id == variant_id)
    }

    /// Add `delta` to the quantity of `(product_id, variant_id)`, creating
    /// the line from `snapshot` if it doesn't already exist. A resulting
    /// quantity of 0 removes the line.
    pub fn add_quantity(&mut self, snapshot: CartItem, delta: i64) {
        let product_id = snapshot.product_id.clone();
        let variant_id = snapshot.variant_id.clone();

        if let Some(line) = self.find_line(&product_id, &variant_id) {
            let new_quantity = i64::from(line.quantity) + delta;
            if new_quantity <= 0 {
                self.items.retain(|item| !(item.product_id == product_id && item.variant_id == variant_id));
            } else {
                #[allow(clippy::cast_sign_loss)]
                {
                    line.quantity = new_quantity as u32;
                }
            }
        } else if delta > 0 {
            #[allow(clippy::cast_sign_loss)]
            let quantity = delta as u32;
            self.items.push(CartItem { quantity, ..snapshot });
        }
    }

    /// Set the quantity of an existing line directly. A quantity of 0
    /// removes the line. No-op if the line doesn't exist.
    pub fn set_quantity(&mut self, product_id: &str, variant_id: &str, quantity: u32) {
        if quantity == 0 {
            self.items.retain(|item| !(item.product_id == product_id && item.variant_id == variant_id));
        } else if let Some(line) = self.find_line(product_id, variant_id) {
            line.quantity = quantity;
        }
    }

    /// Remove a line outright, regardless of quantity.
    pub fn remove_line(&mut self, product_id: &str, variant_id: &str) {
        self.items.retain(|item| !(item.product_id == product_id && item.variant_id == variant_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, variant_id: &str, quantity: u32) -> CartItem {
        CartItem {
            product_id: product_id.to_string(),
            variant_id: variant_id.to_string(),
            name: "Widget".to_string(),
            sku: "W-1".to_string(),
            unit_price_cents: 1500,
            quantity,
            image_url: None,
        }
    }

    #[test]
    fn adding_an_existing_line_increases_quantity() {
        let now = Utc::now();
        let mut cart = Cart::empty("u1", "USD", now);
        cart.add_quantity(line("p1", "v1", 1), 2);
        cart.add_quantity(line("p1", "v1", 1), 3);

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[test]
    fn setting_quantity_to_zero_removes_the_line() {
        let now = Utc::now();
        let mut cart = Cart::empty("u1", "USD", now);
        cart.add_quantity(line("p1", "v1", 1), 2);
        cart.set_quantity("p1", "v1", 0);

        assert!(cart.items.is_empty());
    }

    #[test]
    fn lines_are_deduplicated_by_product_and_variant() {
        let now = Utc::now();
        let mut cart = Cart::empty("u1", "USD", now);
        cart.add_quantity(line("p1", "v1", 1), 1);
        cart.add_quantity(line("p1", "v2", 1), 1);
        cart.add_quantity(line("p2", "v1", 1), 1);

        assert_eq!(cart.items.len(), 3);
    }
}
