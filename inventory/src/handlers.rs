//! HTTP handlers for the inventory service.
//!
//! `GET /inventory/stock/:product_id` and `POST /inventory/availability` are
//! public reads, reached through the gateway. `POST /internal/reservations`
//! and `POST /internal/reservations/:checkout_id/release` are this
//! service's internal surface, called directly by the checkout saga; they
//! carry no `CurrentUser` extractor. Confirmation is not exposed over HTTP
//! at all — it's driven entirely by consuming `order.confirmed` off the
//! event bus (see `main`'s background consumer).

use crate::reducer::{InventoryEnvironment, InventoryReducer};
use crate::types::{InventoryAction, InventoryState, ReservationLineRequest, StockKey, DEFAULT_WAREHOUSE};
use axum::{
    extract::{Path, State},
    Json,
};
use composable_rust_runtime::Store;
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

type InventoryStore = Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default hold duration for a reservation when the caller (checkout)
/// doesn't supply one over the wire.
const DEFAULT_TTL_SECONDS: i64 = 900;

/// A stock row as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct StockResponse {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Warehouse identifier.
    pub warehouse_id: String,
    /// Quantity on hand.
    pub quantity: i64,
    /// Quantity held by active reservations.
    pub reserved: i64,
    /// Quantity available to reserve.
    pub available: i64,
}

impl From<&crate::types::StockRecord> for StockResponse {
    fn from(record: &crate::types::StockRecord) -> Self {
        Self {
            product_id: record.product_id.clone(),
            variant_id: record.variant_id.clone(),
            warehouse_id: record.warehouse_id.clone(),
            quantity: record.quantity,
            reserved: record.reserved,
            available: record.available(),
        }
    }
}

/// Query parameters for `GET /inventory/stock/:product_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct StockQuery {
    /// Variant to look up. Omit for a product with no variants.
    #[serde(default)]
    pub variant_id: Option<String>,
}

/// Look up the stock row for a product/variant in the default warehouse.
///
/// # Endpoint
///
/// `GET /inventory/stock/:product_id`
pub async fn get_stock(
    State(store): State<Arc<InventoryStore>>,
    Path(product_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<StockQuery>,
) -> Result<Json<StockResponse>, AppError> {
    let key = StockKey::new(product_id.clone(), query.variant_id, DEFAULT_WAREHOUSE.to_string());
    let state = store.state(Clone::clone).await;
    let record = state
        .stock_for(&key)
        .ok_or_else(|| AppError::not_found("Stock", &product_id))?;
    Ok(Json(StockResponse::from(record)))
}

/// One line of an availability check.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityLine {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Quantity to check.
    pub quantity: i64,
}

/// Request body for `POST /inventory/availability`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckAvailabilityRequest {
    /// Lines to check.
    pub items: Vec<AvailabilityLine>,
}

/// Whether one requested line can currently be satisfied.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResult {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Quantity requested.
    pub quantity: i64,
    /// Quantity currently available.
    pub available: i64,
    /// Whether `available >= quantity`.
    pub satisfiable: bool,
}

/// Check whether a set of lines could currently be reserved, without
/// holding any stock. A read-only preview; `Reserve` re-checks atomically.
///
/// # Endpoint
///
/// `POST /inventory/availability`
pub async fn check_availability(
    State(store): State<Arc<InventoryStore>>,
    Json(request): Json<CheckAvailabilityRequest>,
) -> Json<Vec<AvailabilityResult>> {
    let state = store.state(Clone::clone).await;
    let results = request
        .items
        .into_iter()
        .map(|line| {
            let key = StockKey::new(line.product_id.clone(), line.variant_id.clone(), DEFAULT_WAREHOUSE.to_string());
            let available = state.stock_for(&key).map_or(0, crate::types::StockRecord::available);
            AvailabilityResult {
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                available,
                satisfiable: available >= line.quantity,
            }
        })
        .collect();
    Json(results)
}

/// One line of a reservation request, as carried over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveItem {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if any.
    pub variant_id: Option<String>,
    /// Quantity to reserve.
    pub quantity: u32,
}

/// Request body for `POST /internal/reservations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    /// Checkout session requesting the hold. Doubles as the reservation
    /// batch's identifier: every line reserved for one call shares it.
    pub checkout_id: String,
    /// Lines to reserve, all-or-nothing.
    pub items: Vec<ReserveItem>,
    /// Hold duration in seconds. Defaults when the caller doesn't send one.
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Response body for `POST /internal/reservations`.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveResponse {
    /// Identifies this reservation batch. Equal to the request's
    /// `checkout_id`: confirm/release always act on the whole batch, so
    /// there's no finer-grained id for callers to track.
    pub reservation_id: String,
}

/// Reserve stock for a checkout's line items, all-or-nothing.
///
/// Internal: called by the checkout saga, never forwarded by the gateway.
///
/// # Errors
///
/// Returns `409` if any line can't be satisfied.
///
/// # Endpoint
///
/// `POST /internal/reservations`
pub async fn reserve(
    State(store): State<Arc<InventoryStore>>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, AppError> {
    let checkout_id = request.checkout_id.clone();
    let action = InventoryAction::Reserve {
        checkout_id: checkout_id.clone(),
        items: request
            .items
            .into_iter()
            .map(|item| ReservationLineRequest {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: i64::from(item.quantity),
            })
            .collect(),
        ttl_seconds: request.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS),
    };

    let result = store
        .send_and_wait_for(
            action,
            |a| matches!(a, InventoryAction::ValidationFailed { .. }),
            COMMAND_TIMEOUT,
        )
        .await;

    // Reserve applies synchronously inside the reducer; failure is the only
    // path that emits a distinguishing action, so a timeout here means
    // success, not that the command never ran.
    if let Ok(InventoryAction::ValidationFailed { error }) = result {
        return Err(AppError::conflict(error));
    }

    let state = store.state(Clone::clone).await;
    if state.reservations_for_checkout(&checkout_id).is_empty() {
        return Err(AppError::internal("reservation not found after reserve"));
    }

    Ok(Json(ReserveResponse { reservation_id: checkout_id }))
}

/// Release every active reservation made for a checkout batch.
///
/// Internal: called by the checkout saga's compensation path when a later
/// step fails, never forwarded by the gateway. Idempotent: releasing a
/// batch with nothing active is a no-op, not an error.
///
/// # Endpoint
///
/// `POST /internal/reservations/:checkout_id/release`
pub async fn release(
    State(store): State<Arc<InventoryStore>>,
    Path(checkout_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let _ = store
        .send(InventoryAction::ReleaseReservations { checkout_id })
        .await;
    Ok(Json(serde_json::json!({ "released": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn store() -> Arc<InventoryStore> {
        let environment = InventoryEnvironment::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(SystemClock),
        );
        Arc::new(Store::new(InventoryState::new(), InventoryReducer::new(), environment))
    }

    async fn seed_stock(store: &InventoryStore, product_id: &str, quantity: i64) {
        store
            .send(InventoryAction::Adjust {
                product_id: product_id.to_string(),
                variant_id: None,
                warehouse_id: DEFAULT_WAREHOUSE.to_string(),
                delta: quantity,
                reason: "seed".to_string(),
                reference: "test".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn reserve_then_get_stock_reflects_hold() {
        let store = store();
        seed_stock(&store, "widget", 10).await;

        let response = reserve(
            State(Arc::clone(&store)),
            Json(ReserveRequest {
                checkout_id: "checkout-1".to_string(),
                items: vec![ReserveItem {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 4,
                }],
                ttl_seconds: None,
            }),
        )
        .await
        .expect("reserve should succeed");

        assert_eq!(response.0.reservation_id, "checkout-1");

        let stock = get_stock(
            State(Arc::clone(&store)),
            Path("widget".to_string()),
            axum::extract::Query(StockQuery { variant_id: None }),
        )
        .await
        .expect("stock should exist");
        assert_eq!(stock.0.reserved, 4);
        assert_eq!(stock.0.available, 6);
    }

    #[tokio::test]
    async fn reserve_rejects_insufficient_stock() {
        let store = store();
        seed_stock(&store, "widget", 1).await;

        let result = reserve(
            State(Arc::clone(&store)),
            Json(ReserveRequest {
                checkout_id: "checkout-2".to_string(),
                items: vec![ReserveItem {
                    product_id: "widget".to_string(),
                    variant_id: None,
                    quantity: 5,
                }],
                ttl_seconds: None,
            }),
        )
        .await;

        assert!(result.is_err());
        let state = store.state(Clone::clone).await;
        assert!(state.reservations_for_checkout("checkout-2").is_empty());
    }

    #[tokio::test]
    async fn release_is_idempotent_on_unknown_checkout() {
        let store = store();
        let response = release(State(store), Path("unknown-checkout".to_string()))
            .await
            .expect("release should not error");
        assert_eq!(response.0["released"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn check_availability_reports_satisfiable_lines() {
        let store = store();
        seed_stock(&store, "widget", 3).await;

        let response = check_availability(
            State(store),
            Json(CheckAvailabilityRequest {
                items: vec![
                    AvailabilityLine {
                        product_id: "widget".to_string(),
                        variant_id: None,
                        quantity: 2,
                    },
                    AvailabilityLine {
                        product_id: "widget".to_string(),
                        variant_id: None,
                        quantity: 10,
                    },
                ],
            }),
        )
        .await;

        assert!(response.0[0].satisfiable);
        assert!(!response.0[1].satisfiable);
    }
}
