//! HTTP handlers for the product catalog service.
//!
//! `GET /products` and `GET /products/:id` are public, reached through the
//! gateway without authentication. Every mutating route requires an
//! authenticated admin (enforced here via `CurrentUser`, since the gateway
//! only verifies the token — authorization is each service's own job).

use crate::reducer::{ProductEnvironment, ProductReducer};
use crate::types::{Product, ProductAction, ProductId, ProductImage, ProductVariant, ProductsState};
use axum::extract::{Path, State};
use axum::Json;
use composable_rust_runtime::Store;
use composable_rust_web::extractors::{CurrentUser, Role};
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type ProductStore = Store<ProductsState, ProductAction, ProductEnvironment, ProductReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::forbidden("admin role required"))
    }
}

/// A product as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct ProductResponse {
    /// Product identifier.
    pub product_id: String,
    /// Display name.
    pub name: String,
    /// URL-unique slug.
    pub slug: String,
    /// Free-text description.
    pub description: String,
    /// Lifecycle status, lowercased.
    pub status: String,
    /// Base price in the smallest currency unit.
    pub base_price_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Variant count.
    pub variant_count: usize,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.product_id.as_str().to_string(),
            name: product.name.clone(),
            slug: product.slug.clone(),
            description: product.description.clone(),
            status: format!("{:?}", product.status).to_lowercase(),
            base_price_cents: product.base_price_cents,
            currency: product.currency.clone(),
            variant_count: product.variants.len(),
        }
    }
}

/// List every published product.
///
/// # Endpoint
///
/// `GET /products`
pub async fn list_products(State(store): State<Arc<ProductStore>>) -> Json<Vec<ProductResponse>> {
    let state = store.state(Clone::clone).await;
    Json(state.published().into_iter().map(ProductResponse::from).collect())
}

/// Fetch one product by id.
///
/// # Endpoint
///
/// `GET /products/:id`
pub async fn get_product(
    State(store): State<Arc<ProductStore>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let state = store.state(Clone::clone).await;
    let product = state
        .get(&ProductId::new(product_id.clone()))
        .ok_or_else(|| AppError::not_found("Product", &product_id))?;
    Ok(Json(ProductResponse::from(product)))
}

/// Request body for `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    /// Display name.
    pub name: String,
    /// URL-unique slug.
    pub slug: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Owning brand, if any.
    #[serde(default)]
    pub brand_id: Option<String>,
    /// Owning category, if any.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Base price in the smallest currency unit.
    pub base_price_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Arbitrary metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Create a new product in `draft`. Admin-only.
///
/// # Endpoint
///
/// `POST /products`
pub async fn create_product(
    State(store): State<Arc<ProductStore>>,
    user: CurrentUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    require_admin(&user)?;

    let product_id = ProductId::generate();
    let action = ProductAction::Create {
        product_id: product_id.clone(),
        name: request.name,
        slug: request.slug,
        description: request.description,
        brand_id: request.brand_id,
        category_id: request.category_id,
        base_price_cents: request.base_price_cents,
        currency: request.currency,
        metadata: request.metadata,
    };

    let result = store
        .send_and_wait_for(action, |a| matches!(a, ProductAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;
    if let Ok(ProductAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    let state = store.state(Clone::clone).await;
    let product = state.get(&product_id).ok_or_else(|| AppError::internal("product not found after create"))?;
    Ok(Json(ProductResponse::from(product)))
}

/// Publish a draft product. Admin-only.
///
/// # Endpoint
///
/// `POST /products/:id/publish`
pub async fn publish_product(
    State(store): State<Arc<ProductStore>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let result = store
        .send_and_wait_for(
            ProductAction::Publish { product_id: ProductId::new(product_id) },
            |a| matches!(a, ProductAction::ValidationFailed { .. }),
            COMMAND_TIMEOUT,
        )
        .await;
    if let Ok(ProductAction::ValidationFailed { error }) = result {
        return Err(AppError::conflict(error));
    }

    Ok(Json(serde_json::json!({ "published": true })))
}

/// Archive a product, hiding it from listing. Admin-only.
///
/// # Endpoint
///
/// `POST /products/:id/archive`
pub async fn archive_product(
    State(store): State<Arc<ProductStore>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let _ = store.send(ProductAction::Archive { product_id: ProductId::new(product_id) }).await;
    Ok(Json(serde_json::json!({ "archived": true })))
}

/// Request body for `PUT /products/:id/variants`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetVariantRequest {
    /// Stock-keeping unit.
    pub sku: String,
    /// Price override, if different from the product's base price.
    #[serde(default)]
    pub price_override_cents: Option<i64>,
    /// Attribute map.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Add or replace a variant by SKU. Admin-only.
///
/// # Endpoint
///
/// `PUT /products/:id/variants`
pub async fn set_variant(
    State(store): State<Arc<ProductStore>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
    Json(request): Json<SetVariantRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let action = ProductAction::SetVariant {
        product_id: ProductId::new(product_id),
        variant: ProductVariant {
            sku: request.sku,
            price_override_cents: request.price_override_cents,
            attributes: request.attributes,
        },
    };
    let result = store
        .send_and_wait_for(action, |a| matches!(a, ProductAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;
    if let Ok(ProductAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Request body for `POST /products/:id/images`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddImageRequest {
    /// URL of the image asset.
    pub url: String,
    /// Display order among this product's images.
    #[serde(default)]
    pub sort_order: i32,
    /// Whether this becomes the primary image.
    #[serde(default)]
    pub is_primary: bool,
}

/// Add an image. Admin-only.
///
/// # Endpoint
///
/// `POST /products/:id/images`
pub async fn add_image(
    State(store): State<Arc<ProductStore>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
    Json(request): Json<AddImageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let action = ProductAction::AddImage {
        product_id: ProductId::new(product_id),
        image: ProductImage { url: request.url, sort_order: request.sort_order, is_primary: request.is_primary },
    };
    let result = store
        .send_and_wait_for(action, |a| matches!(a, ProductAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;
    if let Ok(ProductAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    Ok(Json(serde_json::json!({ "added": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn store() -> Arc<ProductStore> {
        let environment =
            ProductEnvironment::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()), Arc::new(SystemClock));
        Arc::new(Store::new(ProductsState::new(), ProductReducer::new(), environment))
    }

    fn admin() -> CurrentUser {
        CurrentUser { user_id: "admin-1".to_string(), email: None, role: Role::Admin }
    }

    fn customer() -> CurrentUser {
        CurrentUser { user_id: "user-1".to_string(), email: None, role: Role::Customer }
    }

    #[tokio::test]
    async fn customers_cannot_create_products() {
        let store = store();
        let result = create_product(
            State(store),
            customer(),
            Json(CreateProductRequest {
                name: "Widget".to_string(),
                slug: "widget".to_string(),
                description: String::new(),
                brand_id: None,
                category_id: None,
                base_price_cents: 999,
                currency: "USD".to_string(),
                metadata: HashMap::new(),
            }),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_then_publish_shows_up_in_listing() {
        let store = store();
        let created = create_product(
            State(Arc::clone(&store)),
            admin(),
            Json(CreateProductRequest {
                name: "Widget".to_string(),
                slug: "widget".to_string(),
                description: String::new(),
                brand_id: None,
                category_id: None,
                base_price_cents: 999,
                currency: "USD".to_string(),
                metadata: HashMap::new(),
            }),
        )
        .await
        .expect("create should succeed");

        assert!(list_products(State(Arc::clone(&store))).await.0.is_empty());

        publish_product(State(Arc::clone(&store)), admin(), Path(created.0.product_id.clone()))
            .await
            .expect("publish should succeed");

        assert_eq!(list_products(State(store)).await.0.len(), 1);
    }
}
