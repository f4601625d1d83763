//! HTTP handlers for the order service.
//!
//! `list_orders`/`get_order` sit behind the gateway and are scoped by
//! [`CurrentUser`]: a customer sees their own orders, an admin sees all of
//! them. `create_order`/`update_status`/`cancel_order`/`mark_paid` are the
//! service's internal surface — called directly by the checkout saga and by
//! the payment service's settlement callback, not forwarded by the gateway,
//! so they carry no `CurrentUser` extractor.
//!
//! All four mutating handlers follow the same request/response bridge:
//! dispatch a command, wait for the matching event or a `ValidationFailed`.

use crate::reducer::{OrderEnvironment, OrderReducer};
use crate::types::{
    Money, OrderAction, OrderId, OrderLineItem, OrderState, OrderStatus, OrdersState,
    ShippingAddress, UserId,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use composable_rust_runtime::Store;
use composable_rust_web::{AppError, CurrentUser};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

type OrderStore = Store<OrdersState, OrderAction, OrderEnvironment, OrderReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A line item as carried over the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineItemDto {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if the product has variants.
    pub variant_id: Option<String>,
    /// Product name as displayed at order time.
    pub name: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Price per unit in cents.
    pub unit_price_cents: i64,
}

impl From<&OrderLineItem> for LineItemDto {
    fn from(item: &OrderLineItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<LineItemDto> for OrderLineItem {
    fn from(dto: LineItemDto) -> Self {
        Self {
            product_id: dto.product_id,
            variant_id: dto.variant_id,
            name: dto.name,
            quantity: dto.quantity,
            unit_price: Money::from_cents(dto.unit_price_cents),
        }
    }
}

/// A shipping address as carried over the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShippingAddressDto {
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

impl From<&ShippingAddress> for ShippingAddressDto {
    fn from(address: &ShippingAddress) -> Self {
        Self {
            name: address.name.clone(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(dto: ShippingAddressDto) -> Self {
        Self {
            name: dto.name,
            line1: dto.line1,
            line2: dto.line2,
            city: dto.city,
            state: dto.state,
            postal_code: dto.postal_code,
            country: dto.country,
        }
    }
}

/// An order as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    /// Order identifier.
    pub order_id: String,
    /// User who placed the order.
    pub user_id: String,
    /// Line items.
    pub items: Vec<LineItemDto>,
    /// Subtotal before discount and shipping, in cents.
    pub subtotal_cents: i64,
    /// Discount applied, in cents.
    pub discount_cents: i64,
    /// Shipping cost, in cents.
    pub shipping_cents: i64,
    /// Grand total, in cents.
    pub total_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Shipping address.
    pub shipping_address: Option<ShippingAddressDto>,
    /// Payment identifier, once payment has settled.
    pub payment_id: Option<String>,
    /// Current status.
    pub status: String,
}

impl From<&OrderState> for OrderResponse {
    fn from(order: &OrderState) -> Self {
        Self {
            order_id: order
                .order_id
                .as_ref()
                .map(OrderId::as_str)
                .unwrap_or_default()
                .to_string(),
            user_id: order
                .user_id
                .as_ref()
                .map(UserId::as_str)
                .unwrap_or_default()
                .to_string(),
            items: order.items.iter().map(LineItemDto::from).collect(),
            subtotal_cents: order.subtotal.cents(),
            discount_cents: order.discount.cents(),
            shipping_cents: order.shipping.cents(),
            total_cents: order.total.cents(),
            currency: order.currency.clone(),
            shipping_address: order.shipping_address.as_ref().map(ShippingAddressDto::from),
            payment_id: order.payment_id.clone(),
            status: order.status.to_string(),
        }
    }
}

/// List orders visible to the caller.
///
/// A customer sees only their own orders; an admin sees every order.
///
/// # Endpoint
///
/// `GET /orders`
pub async fn list_orders(
    State(store): State<Arc<OrderStore>>,
    current_user: CurrentUser,
) -> Json<Vec<OrderResponse>> {
    let state = store.state(Clone::clone).await;

    let orders = if current_user.role == composable_rust_web::Role::Admin {
        state.orders.values().map(OrderResponse::from).collect()
    } else {
        let user_id = UserId::new(current_user.user_id);
        state
            .for_user(&user_id)
            .into_iter()
            .map(OrderResponse::from)
            .collect()
    };

    Json(orders)
}

/// Get a single order's details.
///
/// Returns `404` if the order doesn't exist, `403` if the caller isn't its
/// owner and isn't an admin.
///
/// # Endpoint
///
/// `GET /orders/:id`
pub async fn get_order(
    State(store): State<Arc<OrderStore>>,
    current_user: CurrentUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let state = store.state(Clone::clone).await;
    let id = OrderId::new(order_id.clone());

    let order = state
        .get(&id)
        .filter(|o| o.exists())
        .ok_or_else(|| AppError::not_found("Order", &order_id))?;

    let owner_id = order.user_id.as_ref().map_or("", UserId::as_str);
    if !current_user.can_access(owner_id) {
        return Err(AppError::forbidden("not authorized to view this order"));
    }

    Ok(Json(OrderResponse::from(order)))
}

/// Request to create an order from a completed checkout saga snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    /// User who placed the order.
    pub user_id: String,
    /// Line items captured at checkout time.
    pub items: Vec<LineItemDto>,
    /// Subtotal before discount and shipping, in cents.
    pub subtotal_cents: i64,
    /// Discount applied, in cents.
    pub discount_cents: i64,
    /// Shipping cost, in cents.
    pub shipping_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Shipping address.
    pub shipping_address: ShippingAddressDto,
    /// Checkout session this order originated from, if the caller is the
    /// checkout saga.
    #[serde(default)]
    pub checkout_session_id: Option<String>,
}

/// Create an order from a checkout saga snapshot.
///
/// Internal: called by the checkout orchestrator directly, never forwarded
/// by the gateway.
///
/// # Endpoint
///
/// `POST /orders`
pub async fn create_order(
    State(store): State<Arc<OrderStore>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let order_id = OrderId::generate();
    let action = OrderAction::CreateOrder {
        order_id: order_id.clone(),
        user_id: UserId::new(request.user_id),
        items: request.items.into_iter().map(OrderLineItem::from).collect(),
        subtotal: Money::from_cents(request.subtotal_cents),
        discount: Money::from_cents(request.discount_cents),
        shipping: Money::from_cents(request.shipping_cents),
        currency: request.currency,
        shipping_address: request.shipping_address.into(),
        checkout_session_id: request.checkout_session_id,
    };

    let result = store
        .send_and_wait_for(
            action,
            |a| {
                matches!(
                    a,
                    OrderAction::OrderCreated { .. } | OrderAction::ValidationFailed { .. }
                )
            },
            COMMAND_TIMEOUT,
        )
        .await
        .map_err(|_| AppError::timeout("order creation timed out"))?;

    match result {
        OrderAction::OrderCreated { .. } => {
            let state = store.state(Clone::clone).await;
            let order = state
                .get(&order_id)
                .ok_or_else(|| AppError::internal("order created but not found in state"))?;
            Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
        },
        OrderAction::ValidationFailed { error } => Err(AppError::validation(error)),
        _ => Err(AppError::internal("unexpected action received")),
    }
}

/// Request to transition an order's status.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status.
    pub status: OrderStatus,
}

/// Transition an order's status.
///
/// Internal: called by the owning services driving the order lifecycle
/// (e.g. a shipping/fulfillment consumer), never forwarded by the gateway.
///
/// # Endpoint
///
/// `POST /orders/:id/status`
pub async fn update_status(
    State(store): State<Arc<OrderStore>>,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let id = OrderId::new(order_id);
    let action = OrderAction::UpdateStatus {
        order_id: id.clone(),
        status: request.status,
    };

    let result = store
        .send_and_wait_for(
            action,
            |a| {
                matches!(
                    a,
                    OrderAction::OrderStatusChanged { .. } | OrderAction::ValidationFailed { .. }
                )
            },
            COMMAND_TIMEOUT,
        )
        .await
        .map_err(|_| AppError::timeout("status update timed out"))?;

    match result {
        OrderAction::OrderStatusChanged { .. } => {
            let state = store.state(Clone::clone).await;
            let order = state
                .get(&id)
                .ok_or_else(|| AppError::internal("order missing after status change"))?;
            Ok(Json(OrderResponse::from(order)))
        },
        OrderAction::ValidationFailed { error } => Err(AppError::validation(error)),
        _ => Err(AppError::internal("unexpected action received")),
    }
}

/// Request to cancel an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrderRequest {
    /// Reason for cancellation.
    pub reason: String,
}

/// Cancel an order.
///
/// Internal: called by the checkout saga's compensation path, never
/// forwarded by the gateway.
///
/// # Endpoint
///
/// `POST /orders/:id/cancel`
pub async fn cancel_order(
    State(store): State<Arc<OrderStore>>,
    Path(order_id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let id = OrderId::new(order_id);
    let action = OrderAction::CancelOrder {
        order_id: id.clone(),
        reason: request.reason,
    };

    let result = store
        .send_and_wait_for(
            action,
            |a| {
                matches!(
                    a,
                    OrderAction::OrderCanceled { .. } | OrderAction::ValidationFailed { .. }
                )
            },
            COMMAND_TIMEOUT,
        )
        .await
        .map_err(|_| AppError::timeout("order cancellation timed out"))?;

    match result {
        OrderAction::OrderCanceled { .. } => {
            let state = store.state(Clone::clone).await;
            let order = state
                .get(&id)
                .ok_or_else(|| AppError::internal("order missing after cancellation"))?;
            Ok(Json(OrderResponse::from(order)))
        },
        OrderAction::ValidationFailed { error } => Err(AppError::validation(error)),
        _ => Err(AppError::internal("unexpected action received")),
    }
}

/// Request to record a settled payment against an order.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPaidRequest {
    /// Payment identifier from the payment service.
    pub payment_id: String,
}

/// Record a settled payment against an order.
///
/// Internal: called by the payment service's settlement callback, never
/// forwarded by the gateway.
///
/// # Endpoint
///
/// `POST /orders/:id/pay`
pub async fn mark_paid(
    State(store): State<Arc<OrderStore>>,
    Path(order_id): Path<String>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let id = OrderId::new(order_id);
    let action = OrderAction::MarkPaid {
        order_id: id.clone(),
        payment_id: request.payment_id,
    };

    let result = store
        .send_and_wait_for(
            action,
            |a| {
                matches!(
                    a,
                    OrderAction::OrderPaid { .. } | OrderAction::ValidationFailed { .. }
                )
            },
            COMMAND_TIMEOUT,
        )
        .await
        .map_err(|_| AppError::timeout("payment settlement timed out"))?;

    match result {
        OrderAction::OrderPaid { .. } => {
            let state = store.state(Clone::clone).await;
            let order = state
                .get(&id)
                .ok_or_else(|| AppError::internal("order missing after payment settlement"))?;
            Ok(Json(OrderResponse::from(order)))
        },
        OrderAction::ValidationFailed { error } => Err(AppError::validation(error)),
        _ => Err(AppError::internal("unexpected action received")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::ShippingAddress;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn store() -> Arc<OrderStore> {
        let env = OrderEnvironment::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(SystemClock),
        );
        Arc::new(Store::new(OrdersState::new(), OrderReducer::new(), env))
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Jess Doe".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let request = CreateOrderRequest {
            user_id: "user-1".to_string(),
            items: vec![LineItemDto {
                product_id: "prod-1".to_string(),
                variant_id: None,
                name: "Widget".to_string(),
                quantity: 1,
                unit_price_cents: 1000,
            }],
            subtotal_cents: 1000,
            discount_cents: 0,
            shipping_cents: 500,
            currency: "USD".to_string(),
            shipping_address: ShippingAddressDto::from(&address()),
            checkout_session_id: None,
        };

        let (status, Json(created)) = create_order(State(Arc::clone(&store)), Json(request))
            .await
            .expect("create succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.total_cents, 1500);
        assert_eq!(created.status, "pending");

        let current_user = CurrentUser {
            user_id: "user-1".to_string(),
            email: None,
            role: composable_rust_web::Role::Customer,
        };
        let Json(fetched) =
            get_order(State(store), current_user, Path(created.order_id.clone()))
                .await
                .expect("get succeeds");
        assert_eq!(fetched.order_id, created.order_id);
    }

    #[tokio::test]
    async fn get_order_rejects_other_users_order() {
        let store = store();
        let request = CreateOrderRequest {
            user_id: "owner".to_string(),
            items: vec![LineItemDto {
                product_id: "prod-1".to_string(),
                variant_id: None,
                name: "Widget".to_string(),
                quantity: 1,
                unit_price_cents: 1000,
            }],
            subtotal_cents: 1000,
            discount_cents: 0,
            shipping_cents: 0,
            currency: "USD".to_string(),
            shipping_address: ShippingAddressDto::from(&address()),
            checkout_session_id: None,
        };
        let (_, Json(created)) = create_order(State(Arc::clone(&store)), Json(request))
            .await
            .expect("create succeeds");

        let intruder = CurrentUser {
            user_id: "someone-else".to_string(),
            email: None,
            role: composable_rust_web::Role::Customer,
        };
        let result = get_order(State(store), intruder, Path(created.order_id)).await;
        assert!(matches!(result, Err(_)));
    }

    #[tokio::test]
    async fn list_orders_scopes_to_customer() {
        let store = store();
        for user in ["user-a", "user-b"] {
            let request = CreateOrderRequest {
                user_id: user.to_string(),
                items: vec![LineItemDto {
                    product_id: "prod-1".to_string(),
                    variant_id: None,
                    name: "Widget".to_string(),
                    quantity: 1,
                    unit_price_cents: 1000,
                }],
                subtotal_cents: 1000,
                discount_cents: 0,
                shipping_cents: 0,
                currency: "USD".to_string(),
                shipping_address: ShippingAddressDto::from(&address()),
                checkout_session_id: None,
            };
            create_order(State(Arc::clone(&store)), Json(request))
                .await
                .expect("create succeeds");
        }

        let current_user = CurrentUser {
            user_id: "user-a".to_string(),
            email: None,
            role: composable_rust_web::Role::Customer,
        };
        let Json(orders) = list_orders(State(Arc::clone(&store)), current_user).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].user_id, "user-a");

        let admin = CurrentUser {
            user_id: "admin-1".to_string(),
            email: None,
            role: composable_rust_web::Role::Admin,
        };
        let Json(all_orders) = list_orders(State(store), admin).await;
        assert_eq!(all_orders.len(), 2);
    }
}
