//! Campaign catalog reducer: direct-mutation-then-persist, the same shape
//! used by `inventory`, `payment`, and `product`.

use crate::discount::select_best_campaign;
use crate::types::{Campaign, CampaignAction, CampaignStatus, CampaignsState};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_core::reducer::Reducer;
use composable_rust_core::stream::StreamId;
use composable_rust_core::{append_events, publish_event};
use std::sync::Arc;

fn topic_for(action: &CampaignAction) -> Option<&'static str> {
    match action {
        CampaignAction::CampaignCreated { .. }
        | CampaignAction::CampaignActivated { .. }
        | CampaignAction::CampaignPaused { .. } => Some("ecommerce.campaign.updated"),
        CampaignAction::CampaignArchived { .. } => Some("ecommerce.campaign.deleted"),
        CampaignAction::DiscountApplied { .. } => Some("ecommerce.campaign.discount_applied"),
        _ => None,
    }
}

/// Environment for the campaign catalog reducer.
#[derive(Clone)]
pub struct CampaignEnvironment {
    /// Event store for persisting campaign events.
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for publishing catalog changes.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for generating timestamps and checking eligibility windows.
    pub clock: Arc<dyn Clock>,
}

impl CampaignEnvironment {
    /// Creates a new campaign environment.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, event_bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { event_store, event_bus, clock }
    }
}

fn validation_failed_effect(error: String) -> Effect<CampaignAction> {
    Effect::Future(Box::pin(async move { Some(CampaignAction::ValidationFailed { error }) }))
}

/// Reducer implementing the campaign catalog's business logic.
#[derive(Clone, Default)]
pub struct CampaignReducer;

impl CampaignReducer {
    /// Creates a new campaign reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn serialize_event(action: &CampaignAction) -> Result<SerializedEvent, String> {
        let event_type = action.event_type().to_string();
        let data = bincode::serialize(action).map_err(|e| format!("failed to serialize event: {e}"))?;
        Ok(SerializedEvent::new(event_type, data, None))
    }

    fn persist_and_publish_effect(
        env: &CampaignEnvironment,
        stream_id: StreamId,
        event: CampaignAction,
    ) -> Effect<CampaignAction> {
        let serialized = match Self::serialize_event(&event) {
            Ok(s) => s,
            Err(error) => {
                tracing::error!("failed to serialize campaign event: {error}");
                return validation_failed_effect(error);
            },
        };

        let event_store = Arc::clone(&env.event_store);
        let append_effect = append_events! {
            store: event_store,
            stream: stream_id.as_str(),
            expected_version: None,
            events: vec![serialized.clone()],
            on_success: |_version| None,
            on_error: |error| {
                tracing::error!("failed to append campaign event: {error}");
                None
            }
        };

        let Some(topic) = topic_for(&event) else {
            return append_effect;
        };

        let bus = Arc::clone(&env.event_bus);
        let publish_effect = publish_event! {
            bus: bus,
            topic: topic,
            event: serialized,
            on_success: || None,
            on_error: |error| {
                tracing::warn!("failed to publish campaign event to {topic}: {error}");
                None
            }
        };

        Effect::Sequential(vec![append_effect, publish_effect])
    }
}

impl Reducer for CampaignReducer {
    type State = CampaignsState;
    type Action = CampaignAction;
    type Environment = CampaignEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            CampaignAction::Create {
                campaign_id,
                name,
                campaign_type,
                discount_value,
                min_order_amount_cents,
                max_discount_amount_cents,
                code,
                max_usage_count,
                start_date,
                end_date,
                applicable_categories,
                applicable_products,
            } => {
                if state.campaigns.contains_key(&campaign_id) {
                    tracing::info!("Create is a no-op: {} already exists", campaign_id.as_str());
                    return vec![Effect::None];
                }
                if let Some(ref code) = code {
                    if state.codes.contains_key(code) {
                        return vec![validation_failed_effect(format!("code {code} already in use"))];
                    }
                }
                if end_date <= start_date {
                    return vec![validation_failed_effect("end_date must be after start_date".to_string())];
                }

                if let Some(ref code) = code {
                    state.codes.insert(code.clone(), campaign_id.clone());
                }
                state.campaigns.insert(
                    campaign_id.clone(),
                    Campaign {
                        campaign_id: campaign_id.clone(),
                        name,
                        campaign_type,
                        discount_value,
                        min_order_amount_cents,
                        max_discount_amount_cents,
                        code,
                        max_usage_count,
                        current_usage_count: 0,
                        start_date,
                        end_date,
                        applicable_categories,
                        applicable_products,
                        status: CampaignStatus::Draft,
                    },
                );

                let stream_id = StreamId::new(format!("campaign-{}", campaign_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, CampaignAction::CampaignCreated { campaign_id })]
            },

            CampaignAction::Activate { campaign_id } => {
                let Some(campaign) = state.campaigns.get(&campaign_id) else {
                    return vec![validation_failed_effect(format!("unknown campaign {}", campaign_id.as_str()))];
                };
                if campaign.status == CampaignStatus::Active {
                    tracing::info!("Activate is a no-op: {} already active", campaign_id.as_str());
                    return vec![Effect::None];
                }
                if matches!(campaign.status, CampaignStatus::Expired | CampaignStatus::Archived) {
                    return vec![validation_failed_effect(format!("cannot activate a {:?} campaign", campaign.status))];
                }

                if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                    campaign.status = CampaignStatus::Active;
                }

                let stream_id = StreamId::new(format!("campaign-{}", campaign_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, CampaignAction::CampaignActivated { campaign_id })]
            },

            CampaignAction::Pause { campaign_id } => {
                let Some(campaign) = state.campaigns.get(&campaign_id) else {
                    return vec![validation_failed_effect(format!("unknown campaign {}", campaign_id.as_str()))];
                };
                if campaign.status == CampaignStatus::Paused {
                    tracing::info!("Pause is a no-op: {} already paused", campaign_id.as_str());
                    return vec![Effect::None];
                }
                if campaign.status != CampaignStatus::Active {
                    return vec![validation_failed_effect("only an active campaign can be paused".to_string())];
                }

                if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                    campaign.status = CampaignStatus::Paused;
                }

                let stream_id = StreamId::new(format!("campaign-{}", campaign_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, CampaignAction::CampaignPaused { campaign_id })]
            },

            CampaignAction::Archive { campaign_id } => {
                let Some(campaign) = state.campaigns.get(&campaign_id) else {
                    return vec![validation_failed_effect(format!("unknown campaign {}", campaign_id.as_str()))];
                };
                if campaign.status == CampaignStatus::Archived {
                    tracing::info!("Archive is a no-op: {} already archived", campaign_id.as_str());
                    return vec![Effect::None];
                }

                if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                    campaign.status = CampaignStatus::Archived;
                }

                let stream_id = StreamId::new(format!("campaign-{}", campaign_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, CampaignAction::CampaignArchived { campaign_id })]
            },

            CampaignAction::ApplyDiscount { checkout_id, subtotal_cents, code } => {
                if let Some((campaign_id, discount_cents)) = state.resolved_discounts.get(&checkout_id).cloned() {
                    tracing::info!("ApplyDiscount is idempotent: {checkout_id} already resolved to {discount_cents}");
                    return vec![Effect::Future(Box::pin(async move {
                        Some(CampaignAction::DiscountApplied { checkout_id, campaign_id, discount_cents })
                    }))];
                }

                let now = env.clock.now();
                let selection =
                    select_best_campaign(state.campaigns.values(), subtotal_cents, code.as_deref(), now)
                        .map(|(campaign, discount)| (campaign.campaign_id.clone(), discount));

                let (campaign_id, discount_cents) = selection.unwrap_or((None, 0));
                if let Some(ref winner_id) = campaign_id {
                    if let Some(campaign) = state.campaigns.get_mut(winner_id) {
                        campaign.current_usage_count += 1;
                    }
                }
                state.resolved_discounts.insert(checkout_id.clone(), (campaign_id.clone(), discount_cents));

                let stream_id = StreamId::new(format!("campaign-discount-{checkout_id}"));
                vec![Self::persist_and_publish_effect(
                    env,
                    stream_id,
                    CampaignAction::DiscountApplied { checkout_id, campaign_id, discount_cents },
                )]
            },

            CampaignAction::CampaignCreated { .. }
            | CampaignAction::CampaignActivated { .. }
            | CampaignAction::CampaignPaused { .. }
            | CampaignAction::CampaignArchived { .. }
            | CampaignAction::DiscountApplied { .. }
            | CampaignAction::ValidationFailed { .. } => vec![Effect::None],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{CampaignId, CampaignType};
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn env() -> CampaignEnvironment {
        CampaignEnvironment::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()), Arc::new(SystemClock))
    }

    fn create_and_activate(state: &mut CampaignsState, reducer: &CampaignReducer, environment: &CampaignEnvironment, id: &str) {
        let now = environment.clock.now();
        reducer.reduce(
            state,
            CampaignAction::Create {
                campaign_id: CampaignId::new(id.to_string()),
                name: "Ten percent off".to_string(),
                campaign_type: CampaignType::Percentage,
                discount_value: 10,
                min_order_amount_cents: None,
                max_discount_amount_cents: None,
                code: None,
                max_usage_count: 100,
                start_date: now - chrono::Duration::days(1),
                end_date: now + chrono::Duration::days(1),
                applicable_categories: Vec::new(),
                applicable_products: Vec::new(),
            },
            environment,
        );
        reducer.reduce(state, CampaignAction::Activate { campaign_id: CampaignId::new(id.to_string()) }, environment);
    }

    #[test]
    fn apply_discount_with_no_campaigns_defaults_to_zero() {
        let mut state = CampaignsState::new();
        let reducer = CampaignReducer::new();
        let environment = env();

        reducer.reduce(
            &mut state,
            CampaignAction::ApplyDiscount { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None },
            &environment,
        );

        assert_eq!(state.resolved_discounts.get("c1").expect("resolved").1, 0);
    }

    #[test]
    fn apply_discount_picks_the_active_automatic_campaign() {
        let mut state = CampaignsState::new();
        let reducer = CampaignReducer::new();
        let environment = env();
        create_and_activate(&mut state, &reducer, &environment, "camp-1");

        reducer.reduce(
            &mut state,
            CampaignAction::ApplyDiscount { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None },
            &environment,
        );

        let (campaign_id, discount_cents) = state.resolved_discounts.get("c1").expect("resolved");
        assert_eq!(*discount_cents, 100);
        assert_eq!(campaign_id.as_ref().expect("campaign won").as_str(), "camp-1");
        assert_eq!(state.get(&CampaignId::new("camp-1".to_string())).unwrap().current_usage_count, 1);
    }

    #[test]
    fn apply_discount_is_idempotent_per_checkout_id() {
        let mut state = CampaignsState::new();
        let reducer = CampaignReducer::new();
        let environment = env();
        create_and_activate(&mut state, &reducer, &environment, "camp-1");

        reducer.reduce(
            &mut state,
            CampaignAction::ApplyDiscount { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None },
            &environment,
        );
        reducer.reduce(
            &mut state,
            CampaignAction::ApplyDiscount { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None },
            &environment,
        );

        assert_eq!(state.get(&CampaignId::new("camp-1".to_string())).unwrap().current_usage_count, 1);
    }
}
