//! HTTP handlers for the checkout saga.
//!
//! Every route here is reached through the gateway, scoped by
//! [`CurrentUser`]: a session is only readable/mutable by the user who
//! started it (or an admin). `process` dispatches the `Process` command and
//! waits for the saga to reach a stable point — `payment_processing`
//! (202, caller polls), a terminal status (200), or a rejection
//! (`ValidationFailed`, mapped to 409/400 depending on cause).

use crate::reducer::{CheckoutEnvironment, CheckoutReducer};
use crate::types::{
    CheckoutAction, CheckoutItem, CheckoutSession, CheckoutSessionsState, Money, SessionId,
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

type CheckoutStore = Store<CheckoutSessionsState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A line item as carried over the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutItemDto {
    /// Product identifier.
    pub product_id: String,
    /// Variant identifier, if the product has variants.
    pub variant_id: Option<String>,
    /// Quantity requested.
    pub quantity: u32,
    /// Price per unit in cents.
    pub unit_price_cents: i64,
}

impl From<&CheckoutItem> for CheckoutItemDto {
    fn from(item: &CheckoutItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<CheckoutItemDto> for CheckoutItem {
    fn from(dto: CheckoutItemDto) -> Self {
        Self {
            product_id: dto.product_id,
            variant_id: dto.variant_id,
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

/// A checkout session as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionResponse {
    /// Session identifier.
    pub session_id: String,
    /// User running the checkout.
    pub user_id: String,
    /// Items being purchased.
    pub items: Vec<CheckoutItemDto>,
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
    /// Current status.
    pub status: String,
    /// Shipping address, once attached.
    pub shipping_address: Option<ShippingAddressDto>,
    /// Order id, once the order has been created.
    pub order_id: Option<String>,
    /// Root cause, once the session has failed.
    pub failure_reason: Option<String>,
    /// When the session expires if not completed.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<&CheckoutSession> for CheckoutSessionResponse {
    fn from(session: &CheckoutSession) -> Self {
        Self {
            session_id: session.id.as_str().to_string(),
            user_id: session.user_id.as_str().to_string(),
            items: session.items.iter().map(CheckoutItemDto::from).collect(),
            subtotal_cents: session.subtotal.cents(),
            discount_cents: session.discount.cents(),
            shipping_cents: session.shipping.cents(),
            total_cents: session.total.cents(),
            currency: session.currency.clone(),
            status: session.status.to_string(),
            shipping_address: session.shipping_address.as_ref().map(ShippingAddressDto::from),
            order_id: session.order_id.clone(),
            failure_reason: session.failure_reason.clone(),
            expires_at: session.expires_at,
        }
    }
}

fn authorize(current_user: &CurrentUser, session: &CheckoutSession) -> Result<(), AppError> {
    if current_user.can_access(session.user_id.as_str()) {
        Ok(())
    } else {
        Err(AppError::forbidden("not authorized to act on this checkout session"))
    }
}

/// Request to start a checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCheckoutRequest {
    /// Items being purchased.
    pub items: Vec<CheckoutItemDto>,
    /// ISO-4217 currency code.
    pub currency: String,
}

/// Start a new checkout session for the caller.
///
/// # Endpoint
///
/// `POST /checkout`
pub async fn initiate_checkout(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Json(request): Json<InitiateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>), AppError> {
    let session_id = SessionId::generate();
    let action = CheckoutAction::InitiateCheckout {
        session_id: session_id.clone(),
        user_id: UserId::new(current_user.user_id),
        items: request.items.into_iter().map(CheckoutItem::from).collect(),
        currency: request.currency,
    };

    let _ = store.send(action).await;
    let state = store.state(Clone::clone).await;
    let session = state
        .get(&session_id)
        .ok_or_else(|| AppError::internal("session created but not found in state"))?;

    Ok((StatusCode::CREATED, Json(CheckoutSessionResponse::from(session))))
}

/// Fetch a checkout session's current state.
///
/// # Endpoint
///
/// `GET /checkout/:id`
pub async fn get_session(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    let state = store.state(Clone::clone).await;
    let id = SessionId::new(session_id.clone());
    let session = state
        .get(&id)
        .ok_or_else(|| AppError::not_found("Checkout session", &session_id))?;

    authorize(&current_user, session)?;
    Ok(Json(CheckoutSessionResponse::from(session)))
}

/// Request to attach a shipping address.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachShippingRequest {
    /// Shipping address.
    pub address: ShippingAddressDto,
}

/// Attach a shipping address to a session.
///
/// # Endpoint
///
/// `PUT /checkout/:id/shipping`
pub async fn attach_shipping(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Path(session_id): Path<String>,
    Json(request): Json<AttachShippingRequest>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    let id = SessionId::new(session_id.clone());
    let existing = store
        .state(Clone::clone)
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Checkout session", &session_id))?;
    authorize(&current_user, &existing)?;

    let action = CheckoutAction::AttachShipping {
        session_id: id.clone(),
        address: request.address.into(),
    };

    // Attaching succeeds synchronously inside the reducer; only the
    // not-found/terminal rejection paths are asynchronous, and those were
    // already ruled out by the pre-check above bar a narrow race.
    let _ = store.send(action).await;

    let state = store.state(Clone::clone).await;
    let session = state
        .get(&id)
        .ok_or_else(|| AppError::internal("session missing after shipping update"))?;
    if session.shipping_address.is_none() {
        return Err(AppError::conflict("session became terminal before shipping could be attached"));
    }
    Ok(Json(CheckoutSessionResponse::from(session)))
}

/// Request to attach a payment method.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachPaymentRequest {
    /// Payment method token/identifier.
    pub method: String,
}

/// Attach a payment method to a session.
///
/// # Endpoint
///
/// `PUT /checkout/:id/payment`
pub async fn attach_payment(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Path(session_id): Path<String>,
    Json(request): Json<AttachPaymentRequest>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    let id = SessionId::new(session_id.clone());
    let existing = store
        .state(Clone::clone)
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Checkout session", &session_id))?;
    authorize(&current_user, &existing)?;

    let method = request.method.clone();
    let action = CheckoutAction::AttachPayment {
        session_id: id.clone(),
        method: request.method,
    };

    // See `attach_shipping`: attaching succeeds synchronously in the reducer.
    let _ = store.send(action).await;

    let state = store.state(Clone::clone).await;
    let session = state
        .get(&id)
        .ok_or_else(|| AppError::internal("session missing after payment update"))?;
    if session.payment_method.as_deref() != Some(method.as_str()) {
        return Err(AppError::conflict("session became terminal before payment could be attached"));
    }
    Ok(Json(CheckoutSessionResponse::from(session)))
}

/// Execute the saga's next step(s) for a session.
///
/// Returns `202` if the session is now waiting on an async payment webhook,
/// `200` with the final state once the session reaches a terminal status,
/// and `409` if a `process` call is already running for this session.
///
/// # Endpoint
///
/// `POST /checkout/:id/process`
pub async fn process(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>), AppError> {
    let id = SessionId::new(session_id.clone());
    let existing = store
        .state(Clone::clone)
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Checkout session", &session_id))?;
    authorize(&current_user, &existing)?;

    let result = store
        .send_and_wait_for(
            CheckoutAction::Process { session_id: id.clone() },
            |a| {
                matches!(
                    a,
                    CheckoutAction::SessionCompleted { .. }
                        | CheckoutAction::SessionFailed { .. }
                        | CheckoutAction::PaymentInitiated { .. }
                        | CheckoutAction::ValidationFailed { .. }
                )
            },
            COMMAND_TIMEOUT,
        )
        .await
        .map_err(|_| AppError::timeout("checkout processing timed out"))?;

    if let CheckoutAction::ValidationFailed { error } = &result {
        return Err(AppError::conflict(error.clone()));
    }

    let state = store.state(Clone::clone).await;
    let session = state
        .get(&id)
        .ok_or_else(|| AppError::internal("session missing after processing"))?;

    let status = if matches!(result, CheckoutAction::PaymentInitiated { .. }) && !session.status.is_terminal() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(CheckoutSessionResponse::from(session))))
}

/// Explicitly abort a non-terminal session, compensating any committed steps.
///
/// # Endpoint
///
/// `POST /checkout/:id/cancel`
pub async fn cancel(
    State(store): State<Arc<CheckoutStore>>,
    current_user: CurrentUser,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    let id = SessionId::new(session_id.clone());
    let existing = store
        .state(Clone::clone)
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Checkout session", &session_id))?;
    authorize(&current_user, &existing)?;

    let result = store
        .send_and_wait_for(
            CheckoutAction::CancelSession { session_id: id.clone() },
            |a| matches!(a, CheckoutAction::ValidationFailed { .. } | CheckoutAction::SessionFailed { .. }),
            COMMAND_TIMEOUT,
        )
        .await;

    if let Ok(CheckoutAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    let state = store.state(Clone::clone).await;
    let session = state
        .get(&id)
        .ok_or_else(|| AppError::internal("session missing after cancellation"))?;
    Ok(Json(CheckoutSessionResponse::from(session)))
}

/// Request body for an async payment provider webhook resolving a pending
/// payment.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookRequest {
    /// Whether the payment ultimately succeeded.
    pub succeeded: bool,
}

/// Resolve a session stuck in `payment_processing` once the payment
/// provider's webhook reports an outcome.
///
/// Internal: called by the payment service, never forwarded by the
/// gateway, and carries no `CurrentUser` extractor.
///
/// # Endpoint
///
/// `POST /internal/checkout/:id/payment-webhook`
pub async fn payment_webhook(
    State(store): State<Arc<CheckoutStore>>,
    Path(session_id): Path<String>,
    Json(request): Json<PaymentWebhookRequest>,
) -> Json<serde_json::Value> {
    let _ = store
        .send(CheckoutAction::PaymentSettled {
            session_id: SessionId::new(session_id),
            succeeded: request.succeeded,
        })
        .await;
    Json(serde_json::json!({ "acknowledged": true }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn store() -> Arc<CheckoutStore> {
        let env = CheckoutEnvironment::new(
            reqwest::Client::new(),
            Arc::new(SystemClock),
            Arc::new(InMemoryEventBus::new()),
            "http://inventory.invalid".to_string(),
            "http://campaign.invalid".to_string(),
            "http://payment.invalid".to_string(),
            "http://order.invalid".to_string(),
            "http://cart.invalid".to_string(),
        );
        Arc::new(Store::new(CheckoutSessionsState::new(), CheckoutReducer::new(), env))
    }

    fn request() -> InitiateCheckoutRequest {
        InitiateCheckoutRequest {
            items: vec![CheckoutItemDto {
                product_id: "prod-1".to_string(),
                variant_id: None,
                quantity: 1,
                unit_price_cents: 1000,
            }],
            currency: "USD".to_string(),
        }
    }

    fn customer(user_id: &str) -> CurrentUser {
        CurrentUser {
            user_id: user_id.to_string(),
            email: None,
            role: composable_rust_web::Role::Customer,
        }
    }

    #[tokio::test]
    async fn initiate_then_get_round_trips() {
        let store = store();
        let (status, Json(created)) = initiate_checkout(State(Arc::clone(&store)), customer("user-1"), Json(request()))
            .await
            .expect("initiate succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, "initiated");
        assert_eq!(created.subtotal_cents, 1000);

        let Json(fetched) = get_session(State(store), customer("user-1"), Path(created.session_id.clone()))
            .await
            .expect("get succeeds");
        assert_eq!(fetched.session_id, created.session_id);
    }

    #[tokio::test]
    async fn get_session_rejects_other_users_session() {
        let store = store();
        let (_, Json(created)) = initiate_checkout(State(Arc::clone(&store)), customer("owner"), Json(request()))
            .await
            .expect("initiate succeeds");

        let result = get_session(State(store), customer("someone-else"), Path(created.session_id)).await;
        assert!(matches!(result, Err(_)));
    }

    #[tokio::test]
    async fn attach_shipping_updates_session() {
        let store = store();
        let (_, Json(created)) = initiate_checkout(State(Arc::clone(&store)), customer("user-1"), Json(request()))
            .await
            .expect("initiate succeeds");

        let address = ShippingAddressDto {
            name: "Jess".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        };

        let Json(updated) = attach_shipping(
            State(store),
            customer("user-1"),
            Path(created.session_id),
            Json(AttachShippingRequest { address }),
        )
        .await
        .expect("attach succeeds");

        assert!(updated.shipping_address.is_some());
    }

    #[tokio::test]
    async fn cancel_initiated_session_marks_it_failed() {
        let store = store();
        let (_, Json(created)) = initiate_checkout(State(Arc::clone(&store)), customer("user-1"), Json(request()))
            .await
            .expect("initiate succeeds");

        let Json(canceled) = cancel(State(store), customer("user-1"), Path(created.session_id))
            .await
            .expect("cancel succeeds");

        assert_eq!(canceled.status, "failed");
    }
}
