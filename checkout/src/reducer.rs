//! Checkout saga reducer.
//!
//! Each remote call (reserve inventory, compute discount, initiate payment,
//! create order, clear cart) is issued as an `Effect::Future` performing a
//! real HTTP call against the owning service; the response resolves to a
//! follow-up action that the reducer's pattern match uses to advance (or
//! compensate) the session. The saga itself holds no database — a session's
//! entire state lives in [`CheckoutSessionsState`], the reducer's own
//! in-memory map.

use crate::types::{
    CheckoutAction, CheckoutItem, CheckoutSession, CheckoutSessionsState, CheckoutStatus,
    SagaStepStatus, SessionId,
};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Environment for the checkout saga: an HTTP client for calling the owning
/// services, a clock, and an event bus for publishing `checkout.completed`.
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// HTTP client used for every service-to-service call.
    pub http: reqwest::Client,
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// Event bus, for publishing `checkout.completed`.
    pub event_bus: Arc<dyn EventBus>,
    /// Base URL of the inventory service's internal API.
    pub inventory_service_url: String,
    /// Base URL of the campaign service's internal API.
    pub campaign_service_url: String,
    /// Base URL of the payment service's internal API.
    pub payment_service_url: String,
    /// Base URL of the order service's internal API.
    pub order_service_url: String,
    /// Base URL of the cart service's internal API.
    pub cart_service_url: String,
}

impl CheckoutEnvironment {
    /// Creates a new checkout environment.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
        event_bus: Arc<dyn EventBus>,
        inventory_service_url: String,
        campaign_service_url: String,
        payment_service_url: String,
        order_service_url: String,
        cart_service_url: String,
    ) -> Self {
        Self {
            http,
            clock,
            event_bus,
            inventory_service_url,
            campaign_service_url,
            payment_service_url,
            order_service_url,
            cart_service_url,
        }
    }
}

#[derive(Serialize)]
struct ReserveRequest<'a> {
    checkout_id: &'a str,
    items: Vec<ReserveItem<'a>>,
}

#[derive(Serialize)]
struct ReserveItem<'a> {
    product_id: &'a str,
    variant_id: Option<&'a str>,
    quantity: u32,
}

#[derive(Deserialize)]
struct ReserveResponse {
    reservation_id: String,
}

async fn reserve_inventory(
    http: reqwest::Client,
    base: String,
    session_id: SessionId,
    items: Vec<CheckoutItem>,
) -> CheckoutAction {
    let request = ReserveRequest {
        checkout_id: session_id.as_str(),
        items: items
            .iter()
            .map(|item| ReserveItem {
                product_id: &item.product_id,
                variant_id: item.variant_id.as_deref(),
                quantity: item.quantity,
            })
            .collect(),
    };

    let result = http
        .post(format!("{base}/internal/reservations"))
        .json(&request)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => match response.json::<ReserveResponse>().await {
            Ok(body) => CheckoutAction::InventoryReserved {
                session_id,
                reservation_id: body.reservation_id,
            },
            Err(error) => CheckoutAction::InventoryReservationFailed {
                session_id,
                error: format!("malformed reservation response: {error}"),
            },
        },
        Ok(response) => CheckoutAction::InventoryReservationFailed {
            session_id,
            error: format!("inventory service returned {}", response.status()),
        },
        Err(error) => CheckoutAction::InventoryReservationFailed {
            session_id,
            error: format!("inventory service unreachable: {error}"),
        },
    }
}

async fn release_inventory(http: reqwest::Client, base: String, reservation_id: String) -> Result<(), String> {
    let result = http
        .post(format!("{base}/internal/reservations/{reservation_id}/release"))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("inventory release returned {}", response.status())),
        Err(error) => Err(format!("inventory service unreachable: {error}")),
    }
}

#[derive(Serialize)]
struct DiscountRequest<'a> {
    checkout_id: &'a str,
    subtotal_cents: i64,
}

#[derive(Deserialize)]
struct DiscountResponse {
    discount_cents: i64,
}

async fn compute_discount(
    http: reqwest::Client,
    base: String,
    session_id: SessionId,
    subtotal_cents: i64,
) -> CheckoutAction {
    let request = DiscountRequest {
        checkout_id: session_id.as_str(),
        subtotal_cents,
    };

    let result = http
        .post(format!("{base}/internal/discounts/apply"))
        .json(&request)
        .send()
        .await;

    let discount_cents = match result {
        Ok(response) if response.status().is_success() => response
            .json::<DiscountResponse>()
            .await
            .map(|body| body.discount_cents)
            .unwrap_or_else(|error| {
                tracing::warn!("malformed discount response, defaulting to 0: {error}");
                0
            }),
        Ok(response) => {
            tracing::warn!("campaign service returned {}, defaulting discount to 0", response.status());
            0
        },
        Err(error) => {
            tracing::warn!("campaign service unreachable, defaulting discount to 0: {error}");
            0
        },
    };

    CheckoutAction::DiscountComputed {
        session_id,
        discount_cents,
    }
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    amount_cents: i64,
    currency: &'a str,
    method: &'a str,
    correlation: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    payment_id: String,
    status: String,
}

async fn initiate_payment(
    http: reqwest::Client,
    base: String,
    session_id: SessionId,
    amount_cents: i64,
    currency: String,
    method: String,
) -> CheckoutAction {
    let request = PaymentRequest {
        amount_cents,
        currency: &currency,
        method: &method,
        correlation: session_id.as_str(),
    };

    let result = http
        .post(format!("{base}/internal/payments"))
        .json(&request)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => match response.json::<PaymentResponse>().await {
            Ok(body) => CheckoutAction::PaymentInitiated {
                session_id,
                payment_id: body.payment_id,
                result: body.status,
            },
            Err(error) => CheckoutAction::PaymentInitiated {
                session_id,
                payment_id: String::new(),
                result: format!("failed: malformed response ({error})"),
            },
        },
        Ok(response) => CheckoutAction::PaymentInitiated {
            session_id,
            payment_id: String::new(),
            result: format!("failed: payment service returned {}", response.status()),
        },
        Err(error) => CheckoutAction::PaymentInitiated {
            session_id,
            payment_id: String::new(),
            result: format!("failed: payment service unreachable ({error})"),
        },
    }
}

async fn compensate_payment(http: reqwest::Client, base: String, payment_id: String) -> Result<(), String> {
    let result = http
        .post(format!("{base}/internal/payments/{payment_id}/refund"))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("payment refund returned {}", response.status())),
        Err(error) => Err(format!("payment service unreachable: {error}")),
    }
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    user_id: &'a str,
    items: Vec<OrderLineItemDto<'a>>,
    subtotal_cents: i64,
    discount_cents: i64,
    shipping_cents: i64,
    currency: &'a str,
    shipping_address: OrderAddressDto<'a>,
    checkout_session_id: &'a str,
}

#[derive(Serialize)]
struct OrderLineItemDto<'a> {
    product_id: &'a str,
    variant_id: Option<&'a str>,
    name: &'a str,
    quantity: u32,
    unit_price_cents: i64,
}

#[derive(Serialize)]
struct OrderAddressDto<'a> {
    name: &'a str,
    line1: &'a str,
    line2: Option<&'a str>,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    country: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    order_id: String,
}

async fn create_order(http: reqwest::Client, base: String, session_id: SessionId, session: CheckoutSession) -> CheckoutAction {
    let Some(address) = session.shipping_address.as_ref() else {
        return CheckoutAction::OrderCreationFailed {
            session_id,
            error: "no shipping address attached".to_string(),
        };
    };

    let request = CreateOrderRequest {
        user_id: session.user_id.as_str(),
        items: session
            .items
            .iter()
            .map(|item| OrderLineItemDto {
                product_id: &item.product_id,
                variant_id: item.variant_id.as_deref(),
                name: &item.product_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price.cents(),
            })
            .collect(),
        subtotal_cents: session.subtotal.cents(),
        discount_cents: session.discount.cents(),
        shipping_cents: session.shipping.cents(),
        currency: &session.currency,
        shipping_address: OrderAddressDto {
            name: &address.name,
            line1: &address.line1,
            line2: address.line2.as_deref(),
            city: &address.city,
            state: &address.state,
            postal_code: &address.postal_code,
            country: &address.country,
        },
        checkout_session_id: session_id.as_str(),
    };

    let result = http.post(format!("{base}/orders")).json(&request).send().await;

    match result {
        Ok(response) if response.status().is_success() => match response.json::<OrderResponse>().await {
            Ok(body) => CheckoutAction::OrderCreated {
                session_id,
                order_id: body.order_id,
            },
            Err(error) => CheckoutAction::OrderCreationFailed {
                session_id,
                error: format!("malformed order response: {error}"),
            },
        },
        Ok(response) => CheckoutAction::OrderCreationFailed {
            session_id,
            error: format!("order service returned {}", response.status()),
        },
        Err(error) => CheckoutAction::OrderCreationFailed {
            session_id,
            error: format!("order service unreachable: {error}"),
        },
    }
}

async fn compensate_order(http: reqwest::Client, base: String, order_id: String, reason: String) -> Result<(), String> {
    #[derive(Serialize)]
    struct CancelBody {
        reason: String,
    }

    let result = http
        .post(format!("{base}/orders/{order_id}/cancel"))
        .json(&CancelBody { reason })
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("order cancel returned {}", response.status())),
        Err(error) => Err(format!("order service unreachable: {error}")),
    }
}

async fn clear_cart_best_effort(http: reqwest::Client, base: String, user_id: String) {
    let result = http.delete(format!("{base}/internal/carts/{user_id}")).send().await;
    if let Err(error) = result {
        tracing::warn!("best-effort cart clear failed for {user_id}: {error}");
    }
}

/// What compensation, if any, is still owed for a session, determined by
/// which resources were committed and not yet undone.
enum CompensationStep {
    Order(String),
    Payment(String),
    Inventory(String),
    None,
}

fn next_compensation_step(session: &CheckoutSession) -> CompensationStep {
    let step_status = |name: &str| {
        session
            .saga_steps
            .iter()
            .rev()
            .find(|step| step.name == name)
            .map(|step| step.status)
    };

    if let (Some(order_id), Some(SagaStepStatus::Completed)) = (&session.order_id, step_status("create_order")) {
        return CompensationStep::Order(order_id.clone());
    }
    if let (Some(payment_id), Some(SagaStepStatus::Completed)) = (&session.payment_id, step_status("initiate_payment")) {
        return CompensationStep::Payment(payment_id.clone());
    }
    if let (Some(reservation_id), Some(SagaStepStatus::Completed)) =
        (&session.reservation_id, step_status("reserve_inventory"))
    {
        return CompensationStep::Inventory(reservation_id.clone());
    }
    CompensationStep::None
}

fn mark_compensated(session: &mut CheckoutSession, step: &str, now: chrono::DateTime<chrono::Utc>) {
    session.record_step(step, SagaStepStatus::Compensated, now, None);
}

/// Checkout saga reducer.
#[derive(Clone, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new checkout reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn start_failure(
        session: &mut CheckoutSession,
        step: &str,
        reason: String,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        session.record_step(step, SagaStepStatus::Failed, now, Some(reason.clone()));
        session.status = CheckoutStatus::Failed;
        session.failure_reason = Some(reason);
    }

    /// Builds the effect that runs the next outstanding compensation step
    /// for a failed session, or finalizes it if nothing is left to undo.
    fn compensation_effects(
        session_id: SessionId,
        session: &CheckoutSession,
        env: &CheckoutEnvironment,
    ) -> Vec<Effect<CheckoutAction>> {
        match next_compensation_step(session) {
            CompensationStep::Order(order_id) => {
                let http = env.http.clone();
                let base = env.order_service_url.clone();
                let reason = session.failure_reason.clone().unwrap_or_default();
                vec![Effect::Future(Box::pin(async move {
                    if let Err(error) = compensate_order(http, base, order_id, reason).await {
                        tracing::error!("order compensation failed: {error}");
                    }
                    Some(CheckoutAction::OrderCompensated { session_id })
                }))]
            },
            CompensationStep::Payment(payment_id) => {
                let http = env.http.clone();
                let base = env.payment_service_url.clone();
                vec![Effect::Future(Box::pin(async move {
                    if let Err(error) = compensate_payment(http, base, payment_id).await {
                        tracing::error!("payment compensation failed: {error}");
                    }
                    Some(CheckoutAction::PaymentCompensated { session_id })
                }))]
            },
            CompensationStep::Inventory(reservation_id) => {
                let http = env.http.clone();
                let base = env.inventory_service_url.clone();
                vec![Effect::Future(Box::pin(async move {
                    if let Err(error) = release_inventory(http, base, reservation_id).await {
                        tracing::error!("inventory compensation failed: {error}");
                    }
                    Some(CheckoutAction::InventoryCompensated { session_id })
                }))]
            },
            CompensationStep::None => {
                let reason = session.failure_reason.clone().unwrap_or_default();
                vec![Effect::Future(Box::pin(async move {
                    Some(CheckoutAction::SessionFailed { session_id, reason })
                }))]
            },
        }
    }

    /// Builds the effect that advances a non-terminal session to its next
    /// saga step, given its current status. Used both by the explicit
    /// `Process` command and automatically after each step's event resolves.
    fn next_step_effects(
        session_id: SessionId,
        session: &CheckoutSession,
        env: &CheckoutEnvironment,
    ) -> Vec<Effect<CheckoutAction>> {
        match session.status {
            CheckoutStatus::Initiated => {
                let http = env.http.clone();
                let base = env.inventory_service_url.clone();
                let items = session.items.clone();
                vec![Effect::Future(Box::pin(async move {
                    Some(reserve_inventory(http, base, session_id, items).await)
                }))]
            },
            CheckoutStatus::ItemsReserved => {
                let http = env.http.clone();
                let base = env.campaign_service_url.clone();
                let subtotal_cents = session.subtotal.cents();
                vec![Effect::Future(Box::pin(async move {
                    Some(compute_discount(http, base, session_id, subtotal_cents).await)
                }))]
            },
            CheckoutStatus::PaymentPending => {
                let Some(method) = session.payment_method.clone() else {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::OrderCreationFailed {
                            session_id,
                            error: "no payment method attached".to_string(),
                        })
                    }))];
                };
                let http = env.http.clone();
                let base = env.payment_service_url.clone();
                let amount_cents = session.total.cents();
                let currency = session.currency.clone();
                vec![Effect::Future(Box::pin(async move {
                    Some(initiate_payment(http, base, session_id, amount_cents, currency, method).await)
                }))]
            },
            CheckoutStatus::PaymentProcessing
            | CheckoutStatus::Completed
            | CheckoutStatus::Failed
            | CheckoutStatus::Expired => vec![Effect::None],
        }
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutSessionsState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::cognitive_complexity)]
    #[allow(clippy::too_many_lines)]
    fn reduce(&self, state: &mut Self::State, action: Self::Action, env: &Self::Environment) -> Vec<Effect<Self::Action>> {
        let now = env.clock.now();

        match action {
            CheckoutAction::InitiateCheckout {
                session_id,
                user_id,
                items,
                currency,
            } => {
                if items.is_empty() {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "checkout must contain at least one item".to_string(),
                        })
                    }))];
                }
                let session = CheckoutSession::new(session_id.clone(), user_id, items, currency, now);
                state.sessions.insert(session_id, session);
                vec![Effect::None]
            },

            CheckoutAction::AttachShipping { session_id, address } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session not found".to_string(),
                        })
                    }))];
                };
                if session.status.is_terminal() {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session is already terminal".to_string(),
                        })
                    }))];
                }
                session.shipping_address = Some(address);
                vec![Effect::None]
            },

            CheckoutAction::AttachPayment { session_id, method } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session not found".to_string(),
                        })
                    }))];
                };
                if session.status.is_terminal() {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session is already terminal".to_string(),
                        })
                    }))];
                }
                session.payment_method = Some(method);
                vec![Effect::None]
            },

            CheckoutAction::Process { session_id } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session not found".to_string(),
                        })
                    }))];
                };

                if session.is_expired(now) && !session.status.is_terminal() {
                    session.status = CheckoutStatus::Expired;
                    return vec![Effect::None];
                }
                if session.status.is_terminal() {
                    return vec![Effect::None];
                }
                if state.processing.contains(&session_id) {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "checkout is already processing".to_string(),
                        })
                    }))];
                }

                state.processing.insert(session_id.clone());
                let session = state.sessions.get(&session_id).expect("just checked");
                Self::next_step_effects(session_id, session, env)
            },

            CheckoutAction::CancelSession { session_id } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session not found".to_string(),
                        })
                    }))];
                };
                if session.status.is_terminal() {
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CheckoutAction::ValidationFailed {
                            error: "session is already terminal".to_string(),
                        })
                    }))];
                }

                session.status = CheckoutStatus::Failed;
                session.failure_reason = Some("canceled by user".to_string());
                let session = state.sessions.get(&session_id).expect("just checked");
                Self::compensation_effects(session_id, session, env)
            },

            CheckoutAction::InventoryReserved {
                session_id,
                reservation_id,
            } => {
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    session.reservation_id = Some(reservation_id);
                    session.status = CheckoutStatus::ItemsReserved;
                    session.record_step("reserve_inventory", SagaStepStatus::Completed, now, None);
                    let session = state.sessions.get(&session_id).expect("just inserted");
                    return Self::next_step_effects(session_id, session, env);
                }
                vec![Effect::None]
            },

            CheckoutAction::InventoryReservationFailed { session_id, error } => {
                state.processing.remove(&session_id);
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::None];
                };
                Self::start_failure(session, "reserve_inventory", error, now);
                let session = state.sessions.get(&session_id).expect("just inserted");
                Self::compensation_effects(session_id, session, env)
            },

            CheckoutAction::DiscountComputed {
                session_id,
                discount_cents,
            } => {
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    session.discount = crate::types::Money::from_cents(discount_cents);
                    session.recompute_total();
                    session.status = CheckoutStatus::PaymentPending;
                    session.record_step("compute_discount", SagaStepStatus::Completed, now, None);
                    let session = state.sessions.get(&session_id).expect("just inserted");
                    return Self::next_step_effects(session_id, session, env);
                }
                vec![Effect::None]
            },

            CheckoutAction::PaymentInitiated {
                session_id,
                payment_id,
                result,
            } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::None];
                };

                if result == "success" {
                    session.payment_id = Some(payment_id);
                    session.record_step("initiate_payment", SagaStepStatus::Completed, now, None);
                    let http = env.http.clone();
                    let base = env.order_service_url.clone();
                    let session_snapshot = session.clone();
                    return vec![Effect::Future(Box::pin(async move {
                        Some(create_order(http, base, session_id, session_snapshot).await)
                    }))];
                }

                if result == "processing" {
                    session.payment_id = Some(payment_id);
                    session.status = CheckoutStatus::PaymentProcessing;
                    session.record_step("initiate_payment", SagaStepStatus::Pending, now, None);
                    state.processing.remove(&session_id);
                    return vec![Effect::None];
                }

                state.processing.remove(&session_id);
                Self::start_failure(session, "initiate_payment", result, now);
                let session = state.sessions.get(&session_id).expect("just inserted");
                Self::compensation_effects(session_id, session, env)
            },

            CheckoutAction::PaymentSettled { session_id, succeeded } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::None];
                };

                if succeeded {
                    session.record_step("initiate_payment", SagaStepStatus::Completed, now, None);
                    let http = env.http.clone();
                    let base = env.order_service_url.clone();
                    let session_snapshot = session.clone();
                    return vec![Effect::Future(Box::pin(async move {
                        Some(create_order(http, base, session_id, session_snapshot).await)
                    }))];
                }

                Self::start_failure(session, "initiate_payment", "payment webhook reported failure".to_string(), now);
                let session = state.sessions.get(&session_id).expect("just inserted");
                Self::compensation_effects(session_id, session, env)
            },

            CheckoutAction::OrderCreated { session_id, order_id } => {
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::None];
                };

                session.order_id = Some(order_id);
                session.record_step("create_order", SagaStepStatus::Completed, now, None);
                session.record_step("finalize", SagaStepStatus::Completed, now, None);
                session.status = CheckoutStatus::Completed;
                state.processing.remove(&session_id);

                let event_bus = Arc::clone(&env.event_bus);
                let http = env.http.clone();
                let cart_base = env.cart_service_url.clone();
                let user_id = session.user_id.as_str().to_string();
                let order_id_for_event = session.order_id.clone().unwrap_or_default();
                let session_id_for_event = session_id.clone();

                vec![Effect::Future(Box::pin(async move {
                    let payload = serde_json::json!({ "session_id": session_id_for_event.as_str(), "order_id": order_id_for_event });
                    if let Ok(data) = serde_json::to_vec(&payload) {
                        let event = SerializedEvent::new("checkout.completed".to_string(), data, None);
                        if let Err(error) = event_bus.publish("ecommerce.checkout.completed", &event).await {
                            tracing::warn!("failed to publish checkout.completed: {error}");
                        }
                    }
                    clear_cart_best_effort(http, cart_base, user_id).await;
                    Some(CheckoutAction::SessionCompleted { session_id: session_id_for_event })
                }))]
            },

            CheckoutAction::OrderCreationFailed { session_id, error } => {
                state.processing.remove(&session_id);
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return vec![Effect::None];
                };
                Self::start_failure(session, "create_order", error, now);
                let session = state.sessions.get(&session_id).expect("just inserted");
                Self::compensation_effects(session_id, session, env)
            },

            CheckoutAction::PaymentCompensated { session_id } => {
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    mark_compensated(session, "initiate_payment", now);
                    let session = state.sessions.get(&session_id).expect("just inserted");
                    return Self::compensation_effects(session_id, session, env);
                }
                vec![Effect::None]
            },

            CheckoutAction::InventoryCompensated { session_id } => {
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    mark_compensated(session, "reserve_inventory", now);
                    let session = state.sessions.get(&session_id).expect("just inserted");
                    return Self::compensation_effects(session_id, session, env);
                }
                vec![Effect::None]
            },

            CheckoutAction::OrderCompensated { session_id } => {
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    mark_compensated(session, "create_order", now);
                    let session = state.sessions.get(&session_id).expect("just inserted");
                    return Self::compensation_effects(session_id, session, env);
                }
                vec![Effect::None]
            },

            CheckoutAction::SessionCompleted { .. } | CheckoutAction::SessionFailed { .. } | CheckoutAction::ValidationFailed { .. } => {
                vec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{CheckoutItem, Money, ShippingAddress, UserId};
    use composable_rust_testing::mocks::InMemoryEventBus;
    use composable_rust_testing::FixedClock;

    fn env() -> CheckoutEnvironment {
        CheckoutEnvironment::new(
            reqwest::Client::new(),
            Arc::new(FixedClock::new(chrono::Utc::now())),
            Arc::new(InMemoryEventBus::new()),
            "http://inventory.invalid".to_string(),
            "http://campaign.invalid".to_string(),
            "http://payment.invalid".to_string(),
            "http://order.invalid".to_string(),
            "http://cart.invalid".to_string(),
        )
    }

    fn item() -> CheckoutItem {
        CheckoutItem {
            product_id: "prod-1".to_string(),
            variant_id: None,
            quantity: 1,
            unit_price: Money::from_cents(1000),
        }
    }

    #[test]
    fn initiate_checkout_rejects_empty_items() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();

        let effects = reducer.reduce(
            &mut state,
            CheckoutAction::InitiateCheckout {
                session_id: SessionId::new("session-1".to_string()),
                user_id: UserId::new("user-1".to_string()),
                items: vec![],
                currency: "USD".to_string(),
            },
            &environment,
        );

        assert_eq!(effects.len(), 1);
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn initiate_checkout_creates_session_in_initiated() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();
        let session_id = SessionId::new("session-1".to_string());

        reducer.reduce(
            &mut state,
            CheckoutAction::InitiateCheckout {
                session_id: session_id.clone(),
                user_id: UserId::new("user-1".to_string()),
                items: vec![item()],
                currency: "USD".to_string(),
            },
            &environment,
        );

        let session = state.get(&session_id).expect("session created");
        assert_eq!(session.status, CheckoutStatus::Initiated);
        assert_eq!(session.subtotal, Money::from_cents(1000));
    }

    #[test]
    fn process_on_terminal_session_is_a_no_op() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();
        let session_id = SessionId::new("session-1".to_string());
        let mut session = CheckoutSession::new(
            session_id.clone(),
            UserId::new("user-1".to_string()),
            vec![item()],
            "USD".to_string(),
            environment.clock.now(),
        );
        session.status = CheckoutStatus::Completed;
        state.sessions.insert(session_id.clone(), session);

        let effects = reducer.reduce(&mut state, CheckoutAction::Process { session_id: session_id.clone() }, &environment);
        assert_eq!(effects.len(), 1);
        assert_eq!(state.get(&session_id).unwrap().status, CheckoutStatus::Completed);
    }

    #[test]
    fn second_concurrent_process_is_rejected() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();
        let session_id = SessionId::new("session-1".to_string());
        let session = CheckoutSession::new(
            session_id.clone(),
            UserId::new("user-1".to_string()),
            vec![item()],
            "USD".to_string(),
            environment.clock.now(),
        );
        state.sessions.insert(session_id.clone(), session);
        state.processing.insert(session_id.clone());

        let effects = reducer.reduce(&mut state, CheckoutAction::Process { session_id }, &environment);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn inventory_failure_moves_session_to_failed_with_no_compensation_needed() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();
        let session_id = SessionId::new("session-1".to_string());
        let session = CheckoutSession::new(
            session_id.clone(),
            UserId::new("user-1".to_string()),
            vec![item()],
            "USD".to_string(),
            environment.clock.now(),
        );
        state.sessions.insert(session_id.clone(), session);

        reducer.reduce(
            &mut state,
            CheckoutAction::InventoryReservationFailed {
                session_id: session_id.clone(),
                error: "insufficient_stock".to_string(),
            },
            &environment,
        );

        let session = state.get(&session_id).expect("session exists");
        assert_eq!(session.status, CheckoutStatus::Failed);
        assert_eq!(session.failure_reason.as_deref(), Some("insufficient_stock"));
    }

    #[test]
    fn order_creation_failure_schedules_payment_then_inventory_compensation() {
        let mut state = CheckoutSessionsState::new();
        let environment = env();
        let reducer = CheckoutReducer::new();
        let session_id = SessionId::new("session-1".to_string());
        let mut session = CheckoutSession::new(
            session_id.clone(),
            UserId::new("user-1".to_string()),
            vec![item()],
            "USD".to_string(),
            environment.clock.now(),
        );
        session.reservation_id = Some("res-1".to_string());
        session.payment_id = Some("pay-1".to_string());
        session.shipping_address = Some(ShippingAddress {
            name: "Jess".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        });
        session.record_step("reserve_inventory", SagaStepStatus::Completed, environment.clock.now(), None);
        session.record_step("initiate_payment", SagaStepStatus::Completed, environment.clock.now(), None);
        state.sessions.insert(session_id.clone(), session);

        let effects = reducer.reduce(
            &mut state,
            CheckoutAction::OrderCreationFailed {
                session_id: session_id.clone(),
                error: "order service unreachable".to_string(),
            },
            &environment,
        );

        assert_eq!(effects.len(), 1);
        let session = state.get(&session_id).expect("session exists");
        assert_eq!(session.status, CheckoutStatus::Failed);

        match next_compensation_step(session) {
            CompensationStep::Payment(id) => assert_eq!(id, "pay-1"),
            _ => panic!("expected payment compensation to run first"),
        }
    }
}
