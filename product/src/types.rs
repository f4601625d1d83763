//! Core domain types for the product catalog.
//!
//! A product is created in `draft`, becomes visible to public listing once
//! `published`, and is never hard-deleted: `archived` hides it from
//! listing while preserving the history orders reference. Slug is
//! immutable once a product has been published.

use chrono::{DateTime, Utc};
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a product.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a `ProductId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `ProductId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("product-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductStatus {
    /// Created but not yet visible to public listing.
    Draft,
    /// Visible to public listing and purchasable.
    Published,
    /// Hidden from listing; order history referencing it is preserved.
    Archived,
}

/// One purchasable variant of a product (e.g. a size/color combination).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    /// Stock-keeping unit, unique across the whole catalog.
    pub sku: String,
    /// Price override in the product's currency's smallest unit; `None`
    /// means the variant uses the product's `base_price`.
    pub price_override_cents: Option<i64>,
    /// Attribute map, e.g. `{"size": "M", "color": "blue"}`.
    pub attributes: HashMap<String, String>,
}

/// One product image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    /// URL of the image asset.
    pub url: String,
    /// Display order among this product's images.
    pub sort_order: i32,
    /// Whether this is the product's primary image. At most one image per
    /// product may have this set; enforced by the reducer.
    pub is_primary: bool,
}

/// A product and its full catalog state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// URL-unique slug. Immutable once published.
    pub slug: String,
    /// Free-text description.
    pub description: String,
    /// Owning brand, if catalogued.
    pub brand_id: Option<String>,
    /// Owning category, if catalogued.
    pub category_id: Option<String>,
    /// Lifecycle status.
    pub status: ProductStatus,
    /// Base price in the smallest currency unit.
    pub base_price_cents: i64,
    /// ISO-4217 currency code, three letters.
    pub currency: String,
    /// Arbitrary key/value metadata.
    pub metadata: HashMap<String, String>,
    /// Variants, keyed by SKU.
    pub variants: HashMap<String, ProductVariant>,
    /// Images, in no particular stored order (sort client-side by
    /// `sort_order`).
    pub images: Vec<ProductImage>,
    /// When this product was created.
    pub created_at: DateTime<Utc>,
    /// When this product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Aggregate state for the whole product catalog.
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProductsState {
    /// Products, indexed by id.
    pub products: HashMap<ProductId, Product>,
    /// Slug uniqueness index, indexed by slug.
    pub slugs: HashMap<String, ProductId>,
}

impl ProductsState {
    /// Creates empty catalog state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a product by id.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    /// Lists every published product, for public listing endpoints.
    #[must_use]
    pub fn published(&self) -> Vec<&Product> {
        self.products.values().filter(|p| p.status == ProductStatus::Published).collect()
    }
}

/// Commands and events for the product aggregate.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum ProductAction {
    // ========== Commands ==========
    /// Command: create a new product in `draft`.
    #[command]
    Create {
        /// Product identifier, assigned by the caller.
        product_id: ProductId,
        /// Display name.
        name: String,
        /// URL-unique slug.
        slug: String,
        /// Free-text description.
        description: String,
        /// Owning brand, if any.
        brand_id: Option<String>,
        /// Owning category, if any.
        category_id: Option<String>,
        /// Base price in the smallest currency unit.
        base_price_cents: i64,
        /// ISO-4217 currency code.
        currency: String,
        /// Arbitrary metadata.
        metadata: HashMap<String, String>,
    },

    /// Command: update a product's descriptive fields. Slug is rejected if
    /// the product has ever been published.
    #[command]
    Update {
        /// Product to update.
        product_id: ProductId,
        /// New display name.
        name: Option<String>,
        /// New slug (rejected once published).
        slug: Option<String>,
        /// New description.
        description: Option<String>,
        /// New base price.
        base_price_cents: Option<i64>,
        /// New metadata (replaces the whole map).
        metadata: Option<HashMap<String, String>>,
    },

    /// Command: add or replace a variant by SKU.
    #[command]
    SetVariant {
        /// Product the variant belongs to.
        product_id: ProductId,
        /// Variant to add or replace.
        variant: ProductVariant,
    },

    /// Command: add an image. Setting `is_primary` demotes any existing
    /// primary image.
    #[command]
    AddImage {
        /// Product the image belongs to.
        product_id: ProductId,
        /// Image to add.
        image: ProductImage,
    },

    /// Command: publish a draft product, exposing it to public listing.
    #[command]
    Publish {
        /// Product to publish.
        product_id: ProductId,
    },

    /// Command: archive a product, hiding it from listing while
    /// preserving any order history that references it.
    #[command]
    Archive {
        /// Product to archive.
        product_id: ProductId,
    },

    // ========== Events ==========
    /// Event: a product was created.
    #[event]
    ProductCreated {
        /// Product identifier.
        product_id: ProductId,
    },
    /// Event: a product's fields were updated.
    #[event]
    ProductUpdated {
        /// Product identifier.
        product_id: ProductId,
    },
    /// Event: a product was published.
    #[event]
    ProductPublished {
        /// Product identifier.
        product_id: ProductId,
    },
    /// Event: a product was archived. Published on the `deleted` topic —
    /// there is no hard delete, but downstream consumers (e.g. search)
    /// should treat this the same way they'd treat a removal.
    #[event]
    ProductArchived {
        /// Product identifier.
        product_id: ProductId,
    },
    /// Event: command validation failed.
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

    #[test]
    fn published_filters_out_draft_and_archived() {
        let mut state = ProductsState::new();
        let draft = Product {
            product_id: ProductId::new("p1".to_string()),
            name: "Draft".to_string(),
            slug: "draft".to_string(),
            description: String::new(),
            brand_id: None,
            category_id: None,
            status: ProductStatus::Draft,
            base_price_cents: 100,
            currency: "USD".to_string(),
            metadata: HashMap::new(),
            variants: HashMap::new(),
            images: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut published = draft.clone();
        published.product_id = ProductId::new("p2".to_string());
        published.status = ProductStatus::Published;

        state.products.insert(draft.product_id.clone(), draft);
        state.products.insert(published.product_id.clone(), published);

        assert_eq!(state.published().len(), 1);
    }
}
