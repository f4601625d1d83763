//! Payment reducer: provider-agnostic initiate/refund/cancel over the
//! closed capability enum in [`crate::provider`].
//!
//! Like `inventory`, commands mutate state directly and synchronously
//! before the resulting event(s) are persisted and published, because
//! `Initiate` can resolve three different ways (succeeded, processing,
//! failed) depending on the provider, and only the terminal outcomes
//! (`PaymentSucceeded`/`PaymentFailed`) are published externally.

use crate::provider::{PaymentProvider, ProviderOutcome};
use crate::types::{PaymentAction, PaymentId, PaymentRecord, PaymentStatus, PaymentsState};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_core::reducer::Reducer;
use composable_rust_core::stream::StreamId;
use composable_rust_core::{append_events, publish_event};
use std::sync::Arc;

fn topic_for(action: &PaymentAction) -> Option<&'static str> {
    match action {
        PaymentAction::PaymentSucceeded { .. } => Some("ecommerce.payment.completed"),
        PaymentAction::PaymentFailed { .. } => Some("ecommerce.payment.failed"),
        _ => None,
    }
}

/// Environment for payment processing: event store/bus for persistence and
/// publication, a clock, an HTTP client and the checkout service's base
/// URL for reporting async settlement back to the saga, and the single
/// provider this service instance is configured to route to.
#[derive(Clone)]
pub struct PaymentEnvironment {
    /// Event store for persisting payment events.
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for publishing `payment.completed`/`payment.failed`.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for generating timestamps.
    pub clock: Arc<dyn Clock>,
    /// HTTP client used to report async settlement back to checkout.
    pub http: reqwest::Client,
    /// Base URL of the checkout service's internal webhook endpoint.
    pub checkout_service_url: String,
    /// The provider this service instance routes every payment to.
    pub provider: PaymentProvider,
}

impl PaymentEnvironment {
    /// Creates a new payment environment.
    #[must_use]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        checkout_service_url: String,
        provider: PaymentProvider,
    ) -> Self {
        Self {
            event_store,
            event_bus,
            clock,
            http,
            checkout_service_url,
            provider,
        }
    }
}

fn validation_failed_effect(error: String) -> Effect<PaymentAction> {
    Effect::Future(Box::pin(async move { Some(PaymentAction::ValidationFailed { error }) }))
}

async fn notify_checkout(http: reqwest::Client, base: String, correlation_id: String, succeeded: bool) {
    let result = http
        .post(format!("{base}/internal/checkout/{correlation_id}/payment-webhook"))
        .json(&serde_json::json!({ "succeeded": succeeded }))
        .send()
        .await;

    if let Err(error) = result {
        tracing::error!("failed to notify checkout of payment settlement: {error}");
    }
}

/// Reducer implementing the payment aggregate's business logic.
#[derive(Clone, Default)]
pub struct PaymentReducer;

impl PaymentReducer {
    /// Creates a new payment reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn serialize_event(action: &PaymentAction) -> Result<SerializedEvent, String> {
        let event_type = action.event_type().to_string();
        let data = bincode::serialize(action).map_err(|e| format!("failed to serialize event: {e}"))?;
        Ok(SerializedEvent::new(event_type, data, None))
    }

    fn persist_and_publish_effects(
        env: &PaymentEnvironment,
        stream_id: StreamId,
        events: Vec<PaymentAction>,
    ) -> Vec<Effect<PaymentAction>> {
        if events.is_empty() {
            return vec![Effect::None];
        }

        let mut serialized = Vec::with_capacity(events.len());
        for event in &events {
            match Self::serialize_event(event) {
                Ok(s) => serialized.push(s),
                Err(error) => {
                    tracing::error!("failed to serialize payment event: {error}");
                    return vec![validation_failed_effect(error)];
                },
            }
        }

        let event_store = Arc::clone(&env.event_store);
        let event_bus = Arc::clone(&env.event_bus);

        let append_effect = append_events! {
            store: event_store,
            stream: stream_id.as_str(),
            expected_version: None,
            events: serialized.clone(),
            on_success: |_version| None,
            on_error: |error| {
                tracing::error!("failed to append payment events: {error}");
                None
            }
        };

        let publish_effects: Vec<Effect<PaymentAction>> = events
            .iter()
            .zip(serialized)
            .filter_map(|(event, serialized_event)| {
                let topic = topic_for(event)?;
                let bus = Arc::clone(&event_bus);
                Some(publish_event! {
                    bus: bus,
                    topic: topic,
                    event: serialized_event,
                    on_success: || None,
                    on_error: |error| {
                        tracing::warn!("failed to publish payment event to {topic}: {error}");
                        None
                    }
                })
            })
            .collect();

        if publish_effects.is_empty() {
            return vec![append_effect];
        }

        vec![Effect::Sequential(vec![append_effect, Effect::Parallel(publish_effects)])]
    }
}

impl Reducer for PaymentReducer {
    type State = PaymentsState;
    type Action = PaymentAction;
    type Environment = PaymentEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            PaymentAction::Initiate {
                payment_id,
                correlation_id,
                amount_cents,
                currency,
                method,
            } => {
                if state.payments.contains_key(&payment_id) {
                    tracing::info!("Initiate is a no-op: {} already exists", payment_id.as_str());
                    return vec![Effect::None];
                }

                if amount_cents <= 0 {
                    return vec![validation_failed_effect("amount must be positive".to_string())];
                }

                let outcome = env.provider.initiate(&method);
                let now = env.clock.now();

                let (status, provider_reference, failure_reason) = match &outcome {
                    ProviderOutcome::Succeeded { reference } => (PaymentStatus::Succeeded, reference.clone(), None),
                    ProviderOutcome::Processing { reference } => (PaymentStatus::Processing, reference.clone(), None),
                    ProviderOutcome::Failed { reason } => (PaymentStatus::Failed, String::new(), Some(reason.clone())),
                };

                state.payments.insert(
                    payment_id.clone(),
                    PaymentRecord {
                        payment_id: payment_id.clone(),
                        correlation_id: correlation_id.clone(),
                        amount_cents,
                        currency,
                        method,
                        provider: env.provider.name().to_string(),
                        provider_reference: provider_reference.clone(),
                        status,
                        failure_reason: failure_reason.clone(),
                        created_at: now,
                    },
                );

                let mut events = vec![PaymentAction::PaymentInitiated {
                    payment_id: payment_id.clone(),
                    correlation_id: correlation_id.clone(),
                    status,
                    provider_reference,
                }];

                match status {
                    PaymentStatus::Succeeded => events.push(PaymentAction::PaymentSucceeded {
                        payment_id: payment_id.clone(),
                        correlation_id,
                    }),
                    PaymentStatus::Failed => events.push(PaymentAction::PaymentFailed {
                        payment_id: payment_id.clone(),
                        correlation_id,
                        reason: failure_reason.unwrap_or_default(),
                    }),
                    PaymentStatus::Processing | PaymentStatus::Refunded | PaymentStatus::Canceled => {},
                }

                let stream_id = StreamId::new(format!("payment-{}", payment_id.as_str()));
                Self::persist_and_publish_effects(env, stream_id, events)
            },

            PaymentAction::SettleWebhook {
                payment_id,
                succeeded,
                failure_reason,
            } => {
                let Some(record) = state.payments.get(&payment_id) else {
                    return vec![validation_failed_effect(format!("unknown payment {}", payment_id.as_str()))];
                };
                if record.status.is_terminal() {
                    tracing::info!("SettleWebhook is a no-op: {} already terminal", payment_id.as_str());
                    return vec![Effect::None];
                }

                let correlation_id = record.correlation_id.clone();
                let new_status = if succeeded { PaymentStatus::Succeeded } else { PaymentStatus::Failed };

                if let Some(record) = state.payments.get_mut(&payment_id) {
                    record.status = new_status;
                    record.failure_reason.clone_from(&failure_reason);
                }

                let event = if succeeded {
                    PaymentAction::PaymentSucceeded {
                        payment_id: payment_id.clone(),
                        correlation_id: correlation_id.clone(),
                    }
                } else {
                    PaymentAction::PaymentFailed {
                        payment_id: payment_id.clone(),
                        correlation_id: correlation_id.clone(),
                        reason: failure_reason.unwrap_or_else(|| "payment declined".to_string()),
                    }
                };

                let stream_id = StreamId::new(format!("payment-{}", payment_id.as_str()));
                let mut effects = Self::persist_and_publish_effects(env, stream_id, vec![event]);

                let http = env.http.clone();
                let base = env.checkout_service_url.clone();
                effects.push(Effect::Future(Box::pin(async move {
                    notify_checkout(http, base, correlation_id, succeeded).await;
                    None
                })));

                effects
            },

            PaymentAction::Refund { payment_id } => {
                let Some(record) = state.payments.get(&payment_id) else {
                    return vec![validation_failed_effect(format!("unknown payment {}", payment_id.as_str()))];
                };
                if record.status.is_terminal() {
                    tracing::info!("Refund is a no-op: {} already terminal", payment_id.as_str());
                    return vec![Effect::None];
                }
                if record.status != PaymentStatus::Succeeded {
                    return vec![validation_failed_effect(format!(
                        "cannot refund payment in status {:?}",
                        record.status
                    ))];
                }

                let reference = record.provider_reference.clone();
                if let Err(error) = env.provider.refund(&reference) {
                    return vec![validation_failed_effect(error.to_string())];
                }

                if let Some(record) = state.payments.get_mut(&payment_id) {
                    record.status = PaymentStatus::Refunded;
                }

                let stream_id = StreamId::new(format!("payment-{}", payment_id.as_str()));
                Self::persist_and_publish_effects(
                    env,
                    stream_id,
                    vec![PaymentAction::PaymentRefunded { payment_id }],
                )
            },

            PaymentAction::Cancel { payment_id } => {
                let Some(record) = state.payments.get(&payment_id) else {
                    return vec![validation_failed_effect(format!("unknown payment {}", payment_id.as_str()))];
                };
                if record.status.is_terminal() {
                    tracing::info!("Cancel is a no-op: {} already terminal", payment_id.as_str());
                    return vec![Effect::None];
                }

                let reference = record.provider_reference.clone();
                if let Err(error) = env.provider.cancel(&reference) {
                    return vec![validation_failed_effect(error.to_string())];
                }

                if let Some(record) = state.payments.get_mut(&payment_id) {
                    record.status = PaymentStatus::Canceled;
                }

                let stream_id = StreamId::new(format!("payment-{}", payment_id.as_str()));
                Self::persist_and_publish_effects(
                    env,
                    stream_id,
                    vec![PaymentAction::PaymentCanceled { payment_id }],
                )
            },

            PaymentAction::PaymentInitiated { .. }
            | PaymentAction::PaymentSucceeded { .. }
            | PaymentAction::PaymentFailed { .. }
            | PaymentAction::PaymentRefunded { .. }
            | PaymentAction::PaymentCanceled { .. }
            | PaymentAction::ValidationFailed { .. } => vec![Effect::None],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};
    use composable_rust_testing::FixedClock;

    fn env(provider: PaymentProvider) -> PaymentEnvironment {
        PaymentEnvironment::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(FixedClock::new(chrono::Utc::now())),
            reqwest::Client::new(),
            "http://checkout.invalid".to_string(),
            provider,
        )
    }

    #[test]
    fn initiate_with_mock_provider_settles_synchronously() {
        let mut state = PaymentsState::new();
        let environment = env(PaymentProvider::Mock);
        let reducer = PaymentReducer::new();
        let payment_id = PaymentId::generate();

        reducer.reduce(
            &mut state,
            PaymentAction::Initiate {
                payment_id: payment_id.clone(),
                correlation_id: "checkout-1".to_string(),
                amount_cents: 1000,
                currency: "USD".to_string(),
                method: "card".to_string(),
            },
            &environment,
        );

        assert_eq!(state.get(&payment_id).unwrap().status, PaymentStatus::Succeeded);
    }

    #[test]
    fn initiate_with_paypal_stays_processing_until_webhook() {
        let mut state = PaymentsState::new();
        let environment = env(PaymentProvider::PayPalLike);
        let reducer = PaymentReducer::new();
        let payment_id = PaymentId::generate();

        reducer.reduce(
            &mut state,
            PaymentAction::Initiate {
                payment_id: payment_id.clone(),
                correlation_id: "checkout-1".to_string(),
                amount_cents: 1000,
                currency: "USD".to_string(),
                method: "paypal".to_string(),
            },
            &environment,
        );
        assert_eq!(state.get(&payment_id).unwrap().status, PaymentStatus::Processing);

        reducer.reduce(
            &mut state,
            PaymentAction::SettleWebhook {
                payment_id: payment_id.clone(),
                succeeded: true,
                failure_reason: None,
            },
            &environment,
        );
        assert_eq!(state.get(&payment_id).unwrap().status, PaymentStatus::Succeeded);
    }

    #[test]
    fn refund_requires_a_succeeded_payment() {
        let mut state = PaymentsState::new();
        let environment = env(PaymentProvider::PayPalLike);
        let reducer = PaymentReducer::new();
        let payment_id = PaymentId::generate();

        reducer.reduce(
            &mut state,
            PaymentAction::Initiate {
                payment_id: payment_id.clone(),
                correlation_id: "checkout-1".to_string(),
                amount_cents: 1000,
                currency: "USD".to_string(),
                method: "paypal".to_string(),
            },
            &environment,
        );

        let effects = reducer.reduce(&mut state, PaymentAction::Refund { payment_id: payment_id.clone() }, &environment);
        assert_eq!(effects.len(), 1);
        assert_eq!(state.get(&payment_id).unwrap().status, PaymentStatus::Processing);
    }

    #[test]
    fn cancel_is_idempotent_once_terminal() {
        let mut state = PaymentsState::new();
        let environment = env(PaymentProvider::Mock);
        let reducer = PaymentReducer::new();
        let payment_id = PaymentId::generate();

        reducer.reduce(
            &mut state,
            PaymentAction::Initiate {
                payment_id: payment_id.clone(),
                correlation_id: "checkout-1".to_string(),
                amount_cents: 1000,
                currency: "USD".to_string(),
                method: "declined-card".to_string(),
            },
            &environment,
        );
        assert_eq!(state.get(&payment_id).unwrap().status, PaymentStatus::Failed);

        let effects = reducer.reduce(&mut state, PaymentAction::Cancel { payment_id }, &environment);
        assert_eq!(effects.len(), 1);
    }
}
