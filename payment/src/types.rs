//! Core domain types for the payment aggregate.
//!
//! A payment is provider-agnostic from the aggregate's point of view: the
//! capability enum in [`provider`](crate::provider) decides whether
//! `Initiate` settles synchronously or goes through a webhook, and the
//! reducer only ever sees the outcome, never the provider's own wire
//! format.

use chrono::{DateTime, Utc};
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a payment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(String);

impl PaymentId {
    /// Creates a `PaymentId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `PaymentId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("payment-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Provider accepted the request but hasn't settled yet (e.g. a
    /// redirect-based flow awaiting its webhook).
    Processing,
    /// Provider captured the funds.
    Succeeded,
    /// Provider declined or errored.
    Failed,
    /// A successful payment was refunded.
    Refunded,
    /// A processing or successful payment was canceled before settlement.
    Canceled,
}

impl PaymentStatus {
    /// Once a payment reaches one of these, no further mutation is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Refunded | Self::Canceled)
    }
}

/// A payment attempt and its current state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment identifier.
    pub payment_id: PaymentId,
    /// Correlation id supplied by the caller (the checkout session id).
    pub correlation_id: String,
    /// Amount captured, in the smallest currency unit.
    pub amount_cents: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Payment method token/identifier supplied by the caller.
    pub method: String,
    /// Name of the provider that handled this payment.
    pub provider: String,
    /// Provider-assigned reference for this payment attempt.
    pub provider_reference: String,
    /// Current status.
    pub status: PaymentStatus,
    /// Reason the payment failed, if it did.
    pub failure_reason: Option<String>,
    /// When this payment was created.
    pub created_at: DateTime<Utc>,
}

/// Aggregate state for the whole payment service.
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentsState {
    /// Payments, indexed by id.
    pub payments: HashMap<PaymentId, PaymentRecord>,
}

impl PaymentsState {
    /// Creates empty payment state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a payment by id.
    #[must_use]
    pub fn get(&self, id: &PaymentId) -> Option<&PaymentRecord> {
        self.payments.get(id)
    }
}

/// Commands and events for the payment aggregate.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum PaymentAction {
    // ========== Commands ==========
    /// Command: initiate a payment against the configured provider.
    #[command]
    Initiate {
        /// Payment identifier, assigned by the caller so the HTTP response
        /// and the persisted record always agree.
        payment_id: PaymentId,
        /// Correlation id (the checkout session id).
        correlation_id: String,
        /// Amount to capture, in the smallest currency unit.
        amount_cents: i64,
        /// ISO-4217 currency code.
        currency: String,
        /// Payment method token/identifier.
        method: String,
    },

    /// Command: resolve a `processing` payment from the provider's async
    /// webhook.
    #[command]
    SettleWebhook {
        /// Payment this webhook resolves.
        payment_id: PaymentId,
        /// Whether the payment ultimately succeeded.
        succeeded: bool,
        /// Reason reported on failure.
        failure_reason: Option<String>,
    },

    /// Command: refund a succeeded payment.
    #[command]
    Refund {
        /// Payment to refund.
        payment_id: PaymentId,
    },

    /// Command: cancel a payment that hasn't settled yet.
    #[command]
    Cancel {
        /// Payment to cancel.
        payment_id: PaymentId,
    },

    // ========== Events ==========
    /// Event: a payment was created against the provider.
    #[event]
    PaymentInitiated {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Correlation id.
        correlation_id: String,
        /// Resulting status: `processing`, `succeeded`, or `failed`.
        status: PaymentStatus,
        /// Provider reference.
        provider_reference: String,
    },

    /// Event: a payment captured funds successfully. Published externally.
    #[event]
    PaymentSucceeded {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Correlation id.
        correlation_id: String,
    },

    /// Event: a payment failed or was declined. Published externally.
    #[event]
    PaymentFailed {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Correlation id.
        correlation_id: String,
        /// Failure reason.
        reason: String,
    },

    /// Event: a succeeded payment was refunded.
    #[event]
    PaymentRefunded {
        /// Payment identifier.
        payment_id: PaymentId,
    },

    /// Event: a payment was canceled before it settled.
    #[event]
    PaymentCanceled {
        /// Payment identifier.
        payment_id: PaymentId,
    },

    /// Event: command validation failed (unknown payment, wrong state for
    /// the requested operation, etc).
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
    fn terminal_statuses_exclude_processing_and_succeeded() {
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(!PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(PaymentStatus::Canceled.is_terminal());
    }

    #[test]
    fn payment_action_tags_commands_and_events() {
        assert!(PaymentAction::Initiate {
            payment_id: PaymentId::generate(),
            correlation_id: "checkout-1".to_string(),
            amount_cents: 1000,
            currency: "USD".to_string(),
            method: "card".to_string(),
        }
        .is_command());
        assert!(PaymentAction::PaymentSucceeded {
            payment_id: PaymentId::generate(),
            correlation_id: "checkout-1".to_string(),
        }
        .is_event());
    }
}
