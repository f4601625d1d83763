//! HTTP handlers for the payment service.
//!
//! Every route here is internal: called directly by the checkout saga
//! (`initiate`/`refund`/`cancel`) or by a provider's webhook endpoint
//! (`settle_webhook`, simulated here since there's no real provider
//! sandbox to call back from). None of this is forwarded by the gateway.

use crate::reducer::{PaymentEnvironment, PaymentReducer};
use crate::types::{PaymentAction, PaymentId, PaymentStatus, PaymentsState};
use axum::extract::{Path, State};
use axum::Json;
use composable_rust_runtime::Store;
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

type PaymentStore = Store<PaymentsState, PaymentAction, PaymentEnvironment, PaymentReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for `POST /internal/payments`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    /// Amount to capture, in the smallest currency unit.
    pub amount_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Payment method token/identifier.
    pub method: String,
    /// Correlation id (the checkout session id).
    pub correlation: String,
}

/// Response body for `POST /internal/payments`. `status` is rendered as
/// one of the literal strings the checkout saga already parses:
/// `"success"`, `"processing"`, or `"failed: <reason>"`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    /// Payment identifier, generated by this service.
    pub payment_id: String,
    /// Outcome as a checkout-parseable string.
    pub status: String,
}

fn status_string(status: PaymentStatus, failure_reason: Option<&str>) -> String {
    match status {
        PaymentStatus::Succeeded => "success".to_string(),
        PaymentStatus::Processing => "processing".to_string(),
        PaymentStatus::Failed => format!("failed: {}", failure_reason.unwrap_or("unknown reason")),
        PaymentStatus::Refunded | PaymentStatus::Canceled => "failed: payment no longer active".to_string(),
    }
}

/// Initiate a payment against the configured provider.
///
/// # Errors
///
/// Never fails validation over HTTP: a provider decline is reported as a
/// `200` response with `status: "failed: ..."`, matching checkout's own
/// parsing of this endpoint. Only infrastructure failures surface as an
/// `AppError`.
///
/// # Endpoint
///
/// `POST /internal/payments`
pub async fn initiate(
    State(store): State<Arc<PaymentStore>>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment_id = PaymentId::generate();
    let action = PaymentAction::Initiate {
        payment_id: payment_id.clone(),
        correlation_id: request.correlation,
        amount_cents: request.amount_cents,
        currency: request.currency,
        method: request.method,
    };

    let result = store
        .send_and_wait_for(action, |a| matches!(a, PaymentAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;

    if let Ok(PaymentAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    let state = store.state(Clone::clone).await;
    let record = state
        .get(&payment_id)
        .ok_or_else(|| AppError::internal("payment not found after initiate"))?;

    Ok(Json(PaymentResponse {
        payment_id: payment_id.as_str().to_string(),
        status: status_string(record.status, record.failure_reason.as_deref()),
    }))
}

/// Refund a succeeded payment.
///
/// # Endpoint
///
/// `POST /internal/payments/:id/refund`
pub async fn refund(
    State(store): State<Arc<PaymentStore>>,
    Path(payment_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action = PaymentAction::Refund { payment_id: PaymentId::new(payment_id) };
    let result = store
        .send_and_wait_for(action, |a| matches!(a, PaymentAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;

    if let Ok(PaymentAction::ValidationFailed { error }) = result {
        return Err(AppError::conflict(error));
    }

    Ok(Json(serde_json::json!({ "refunded": true })))
}

/// Cancel a payment that hasn't settled yet.
///
/// # Endpoint
///
/// `POST /internal/payments/:id/cancel`
pub async fn cancel(
    State(store): State<Arc<PaymentStore>>,
    Path(payment_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let _ = store.send(PaymentAction::Cancel { payment_id: PaymentId::new(payment_id) }).await;
    Ok(Json(serde_json::json!({ "canceled": true })))
}

/// Request body simulating a provider's async settlement webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    /// Whether the payment ultimately succeeded.
    pub succeeded: bool,
    /// Reason reported on failure.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Resolve a `processing` payment, as a PayPal-like provider's webhook
/// would. Settling here also reports the outcome back to checkout via
/// `PaymentEnvironment::checkout_service_url`.
///
/// # Endpoint
///
/// `POST /internal/payments/:id/webhook`
pub async fn settle_webhook(
    State(store): State<Arc<PaymentStore>>,
    Path(payment_id): Path<String>,
    Json(request): Json<WebhookRequest>,
) -> Json<serde_json::Value> {
    let _ = store
        .send(PaymentAction::SettleWebhook {
            payment_id: PaymentId::new(payment_id),
            succeeded: request.succeeded,
            failure_reason: request.failure_reason,
        })
        .await;
    Json(serde_json::json!({ "acknowledged": true }))
}
