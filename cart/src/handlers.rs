//! HTTP handlers for the cart service.
//!
//! Public routes are reached through the gateway and require an
//! authenticated `CurrentUser`; the cart acted on is always the caller's
//! own (`user_id` is taken from identity, never from the path). The
//! `/internal/carts/:user_id` route is called service-to-service by
//! checkout's saga to clear a cart post-`completed` and is not gated by
//! `CurrentUser`, matching the other services' `/internal/...` routes.

use crate::store::{RedisCartStore, WriteOutcome};
use crate::types::{Cart, CartItem};
use axum::extract::{Path, State};
use axum::Json;
use composable_rust_web::extractors::CurrentUser;
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A cart as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct CartResponse {
    /// Owning user.
    pub user_id: String,
    /// Line items.
    pub items: Vec<CartItem>,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Current version; pass this back as `expected_version` on the next write.
    pub version: u64,
    /// Sum of line subtotals, in the smallest currency unit.
    pub subtotal_cents: i64,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal_cents: cart.subtotal_cents(),
            user_id: cart.user_id,
            items: cart.items,
            currency: cart.currency,
            version: cart.version,
        }
    }
}

/// Fetch the caller's cart. An absent cart is reported as an empty one at
/// version 0, never a 404 — there is nothing to 404 on, the cart simply
/// hasn't been written yet.
///
/// # Endpoint
///
/// `GET /cart`
pub async fn get_cart(
    State(store): State<Arc<RedisCartStore>>,
    user: CurrentUser,
) -> Result<Json<CartResponse>, AppError> {
    let cart = store.get(&user.user_id).await?;
    let cart = cart.unwrap_or_else(|| Cart::empty(user.user_id, "USD", chrono::Utc::now()));
    Ok(Json(CartResponse::from(cart)))
}

/// Request body for `POST /cart/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemRequest {
    /// Version the caller last observed; 0 for a brand new cart.
    pub expected_version: u64,
    /// Product identifier.
    pub product_id: String,
    /// Variant SKU.
    pub variant_id: String,
    /// Display name, snapshotted onto the line.
    pub name: String,
    /// Stock-keeping unit, snapshotted onto the line.
    pub sku: String,
    /// Unit price in the smallest currency unit, snapshotted onto the line.
    pub unit_price_cents: i64,
    /// Quantity to add. Added to any existing line for the same `(product_id, variant_id)`.
    pub quantity: u32,
    /// Thumbnail URL, snapshotted onto the line.
    #[serde(default)]
    pub image_url: Option<String>,
    /// ISO-4217 currency code of this request; must match the cart's existing currency.
    pub currency: String,
}

/// Add an item to the caller's cart, or increase its quantity if the
/// `(product_id, variant_id)` line already exists.
///
/// # Endpoint
///
/// `POST /cart/items`
pub async fn add_item(
    State(store): State<Arc<RedisCartStore>>,
    user: CurrentUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if request.quantity == 0 {
        return Err(AppError::bad_request("quantity must be at least 1"));
    }

    let snapshot = CartItem {
        product_id: request.product_id,
        variant_id: request.variant_id,
        name: request.name,
        sku: request.sku,
        unit_price_cents: request.unit_price_cents,
        quantity: request.quantity,
        image_url: request.image_url,
    };
    let delta = i64::from(request.quantity);
    let currency = request.currency;
    let user_id = user.user_id.clone();

    let outcome = store
        .write(&user.user_id, request.expected_version, move |current| {
            let mut cart = current.unwrap_or_else(|| Cart::empty(user_id, currency, chrono::Utc::now()));
            cart.add_quantity(snapshot, delta);
            cart
        })
        .await?;

    match outcome {
        WriteOutcome::Applied(cart) => Ok(Json(CartResponse::from(cart))),
        WriteOutcome::Conflict => Err(AppError::conflict("cart version mismatch, refetch and retry")),
    }
}

/// Request body for `PUT /cart/items/:line_id`, where `:line_id` is
/// `{product_id}:{variant_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemRequest {
    /// Version the caller last observed.
    pub expected_version: u64,
    /// New quantity. 0 removes the line.
    pub quantity: u32,
}

fn split_line_id(line_id: &str) -> Result<(&str, &str), AppError> {
    line_id
        .split_once(':')
        .ok_or_else(|| AppError::bad_request("line id must be of the form product_id:variant_id"))
}

/// Set the quantity of an existing line. A quantity of 0 removes it.
///
/// # Endpoint
///
/// `PUT /cart/items/:line_id`
pub async fn update_item(
    State(store): State<Arc<RedisCartStore>>,
    user: CurrentUser,
    Path(line_id): Path<String>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let (product_id, variant_id) = split_line_id(&line_id)?;
    let (product_id, variant_id) = (product_id.to_string(), variant_id.to_string());
    let user_id = user.user_id.clone();

    let outcome = store
        .write(&user.user_id, request.expected_version, move |current| {
            let mut cart = current.unwrap_or_else(|| Cart::empty(user_id, "USD", chrono::Utc::now()));
            cart.set_quantity(&product_id, &variant_id, request.quantity);
            cart
        })
        .await?;

    match outcome {
        WriteOutcome::Applied(cart) => Ok(Json(CartResponse::from(cart))),
        WriteOutcome::Conflict => Err(AppError::conflict("cart version mismatch, refetch and retry")),
    }
}

/// Request body for `DELETE /cart/items/:line_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveItemRequest {
    /// Version the caller last observed.
    pub expected_version: u64,
}

/// Remove a line outright, regardless of its current quantity.
///
/// # Endpoint
///
/// `DELETE /cart/items/:line_id`
pub async fn remove_item(
    State(store): State<Arc<RedisCartStore>>,
    user: CurrentUser,
    Path(line_id): Path<String>,
    Json(request): Json<RemoveItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let (product_id, variant_id) = split_line_id(&line_id)?;
    let (product_id, variant_id) = (product_id.to_string(), variant_id.to_string());
    let user_id = user.user_id.clone();

    let outcome = store
        .write(&user.user_id, request.expected_version, move |current| {
            let mut cart = current.unwrap_or_else(|| Cart::empty(user_id, "USD", chrono::Utc::now()));
            cart.remove_line(&product_id, &variant_id);
            cart
        })
        .await?;

    match outcome {
        WriteOutcome::Applied(cart) => Ok(Json(CartResponse::from(cart))),
        WriteOutcome::Conflict => Err(AppError::conflict("cart version mismatch, refetch and retry")),
    }
}

/// Clear the caller's own cart.
///
/// # Endpoint
///
/// `DELETE /cart`
pub async fn clear_cart(
    State(store): State<Arc<RedisCartStore>>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    store.clear(&user.user_id).await?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}

/// Clear a cart by `user_id`, called service-to-service by checkout's saga
/// after a purchase completes. Idempotent; not gated by `CurrentUser`.
///
/// # Endpoint
///
/// `DELETE /internal/carts/:user_id`
pub async fn internal_clear_cart(
    State(store): State<Arc<RedisCartStore>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    store.clear(&user_id).await?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use composable_rust_web::extractors::Role;

    // Requires a live Redis instance: docker run -d -p 6379:6379 redis:7-alpine
    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    async fn store() -> Arc<RedisCartStore> {
        Arc::new(RedisCartStore::new(REDIS_URL).await.unwrap())
    }

    fn user(id: &str) -> CurrentUser {
        CurrentUser { user_id: id.to_string(), email: None, role: Role::Customer }
    }

    #[tokio::test]
    #[ignore]
    async fn adding_an_item_to_a_fresh_cart_starts_at_version_one() {
        let store = store().await;
        let caller = user(&format!("test:{}", uuid::Uuid::new_v4()));

        let response = add_item(
            State(Arc::clone(&store)),
            caller.clone(),
            Json(AddItemRequest {
                expected_version: 0,
                product_id: "p1".to_string(),
                variant_id: "v1".to_string(),
                name: "Widget".to_string(),
                sku: "W-1".to_string(),
                unit_price_cents: 1500,
                quantity: 2,
                image_url: None,
                currency: "USD".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.version, 1);
        assert_eq!(response.0.items.len(), 1);
        assert_eq!(response.0.subtotal_cents, 3000);

        clear_cart(State(store), caller).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn stale_expected_version_reports_409_as_an_app_error() {
        let store = store().await;
        let caller = user(&format!("test:{}", uuid::Uuid::new_v4()));

        let request = AddItemRequest {
            expected_version: 0,
            product_id: "p1".to_string(),
            variant_id: "v1".to_string(),
            name: "Widget".to_string(),
            sku: "W-1".to_string(),
            unit_price_cents: 1500,
            quantity: 1,
            image_url: None,
            currency: "USD".to_string(),
        };

        add_item(State(Arc::clone(&store)), caller.clone(), Json(request.clone())).await.unwrap();
        let result = add_item(State(Arc::clone(&store)), caller.clone(), Json(request)).await;

        assert!(result.is_err());
        clear_cart(State(store), caller).await.unwrap();
    }
}
