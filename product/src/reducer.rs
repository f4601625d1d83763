//! Product catalog reducer: direct-mutation-then-persist, same shape as
//! `inventory`'s and `payment`'s reducers.

use crate::types::{Product, ProductAction, ProductStatus, ProductsState};
use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_bus::EventBus;
use composable_rust_core::event_store::EventStore;
use composable_rust_core::reducer::Reducer;
use composable_rust_core::stream::StreamId;
use composable_rust_core::{append_events, publish_event};
use std::sync::Arc;

fn topic_for(action: &ProductAction) -> Option<&'static str> {
    match action {
        ProductAction::ProductCreated { .. } => Some("ecommerce.product.created"),
        ProductAction::ProductUpdated { .. } | ProductAction::ProductPublished { .. } => {
            Some("ecommerce.product.updated")
        },
        ProductAction::ProductArchived { .. } => Some("ecommerce.product.deleted"),
        _ => None,
    }
}

/// Environment for the product catalog reducer.
#[derive(Clone)]
pub struct ProductEnvironment {
    /// Event store for persisting product events.
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for publishing catalog changes.
    pub event_bus: Arc<dyn EventBus>,
    /// Clock for generating timestamps.
    pub clock: Arc<dyn Clock>,
}

impl ProductEnvironment {
    /// Creates a new product environment.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, event_bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { event_store, event_bus, clock }
    }
}

fn validation_failed_effect(error: String) -> Effect<ProductAction> {
    Effect::Future(Box::pin(async move { Some(ProductAction::ValidationFailed { error }) }))
}

/// Reducer implementing the product catalog's business logic.
#[derive(Clone, Default)]
pub struct ProductReducer;

impl ProductReducer {
    /// Creates a new product reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn serialize_event(action: &ProductAction) -> Result<SerializedEvent, String> {
        let event_type = action.event_type().to_string();
        let data = bincode::serialize(action).map_err(|e| format!("failed to serialize event: {e}"))?;
        Ok(SerializedEvent::new(event_type, data, None))
    }

    fn persist_and_publish_effect(
        env: &ProductEnvironment,
        stream_id: StreamId,
        event: ProductAction,
    ) -> Effect<ProductAction> {
        let serialized = match Self::serialize_event(&event) {
            Ok(s) => s,
            Err(error) => {
                tracing::error!("failed to serialize product event: {error}");
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
                tracing::error!("failed to append product event: {error}");
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
                tracing::warn!("failed to publish product event to {topic}: {error}");
                None
            }
        };

        Effect::Sequential(vec![append_effect, publish_effect])
    }
}

impl Reducer for ProductReducer {
    type State = ProductsState;
    type Action = ProductAction;
    type Environment = ProductEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            ProductAction::Create {
                product_id,
                name,
                slug,
                description,
                brand_id,
                category_id,
                base_price_cents,
                currency,
                metadata,
            } => {
                if state.products.contains_key(&product_id) {
                    tracing::info!("Create is a no-op: {} already exists", product_id.as_str());
                    return vec![Effect::None];
                }
                if state.slugs.contains_key(&slug) {
                    return vec![validation_failed_effect(format!("slug {slug} already in use"))];
                }
                if currency.len() != 3 {
                    return vec![validation_failed_effect("currency must be a 3-letter ISO-4217 code".to_string())];
                }

                let now = env.clock.now();
                state.slugs.insert(slug.clone(), product_id.clone());
                state.products.insert(
                    product_id.clone(),
                    Product {
                        product_id: product_id.clone(),
                        name,
                        slug,
                        description,
                        brand_id,
                        category_id,
                        status: ProductStatus::Draft,
                        base_price_cents,
                        currency,
                        metadata,
                        variants: std::collections::HashMap::new(),
                        images: Vec::new(),
                        created_at: now,
                        updated_at: now,
                    },
                );

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductCreated { product_id })]
            },

            ProductAction::Update { product_id, name, slug, description, base_price_cents, metadata } => {
                let Some(product) = state.products.get(&product_id) else {
                    return vec![validation_failed_effect(format!("unknown product {}", product_id.as_str()))];
                };

                if let Some(ref new_slug) = slug {
                    if product.status != ProductStatus::Draft {
                        return vec![validation_failed_effect("slug is immutable once published".to_string())];
                    }
                    if state.slugs.get(new_slug).is_some_and(|owner| owner != &product_id) {
                        return vec![validation_failed_effect(format!("slug {new_slug} already in use"))];
                    }
                }

                let now = env.clock.now();
                let old_slug = product.slug.clone();
                if let Some(product) = state.products.get_mut(&product_id) {
                    if let Some(name) = name {
                        product.name = name;
                    }
                    if let Some(ref new_slug) = slug {
                        product.slug.clone_from(new_slug);
                    }
                    if let Some(description) = description {
                        product.description = description;
                    }
                    if let Some(base_price_cents) = base_price_cents {
                        product.base_price_cents = base_price_cents;
                    }
                    if let Some(metadata) = metadata {
                        product.metadata = metadata;
                    }
                    product.updated_at = now;
                }
                if let Some(new_slug) = slug {
                    state.slugs.remove(&old_slug);
                    state.slugs.insert(new_slug, product_id.clone());
                }

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductUpdated { product_id })]
            },

            ProductAction::SetVariant { product_id, variant } => {
                if !state.products.contains_key(&product_id) {
                    return vec![validation_failed_effect(format!("unknown product {}", product_id.as_str()))];
                }
                if let Some(product) = state.products.get_mut(&product_id) {
                    product.variants.insert(variant.sku.clone(), variant);
                    product.updated_at = env.clock.now();
                }

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductUpdated { product_id })]
            },

            ProductAction::AddImage { product_id, image } => {
                if !state.products.contains_key(&product_id) {
                    return vec![validation_failed_effect(format!("unknown product {}", product_id.as_str()))];
                }
                if let Some(product) = state.products.get_mut(&product_id) {
                    if image.is_primary {
                        for existing in &mut product.images {
                            existing.is_primary = false;
                        }
                    }
                    product.images.push(image);
                    product.updated_at = env.clock.now();
                }

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductUpdated { product_id })]
            },

            ProductAction::Publish { product_id } => {
                let Some(product) = state.products.get(&product_id) else {
                    return vec![validation_failed_effect(format!("unknown product {}", product_id.as_str()))];
                };
                if product.status == ProductStatus::Published {
                    tracing::info!("Publish is a no-op: {} already published", product_id.as_str());
                    return vec![Effect::None];
                }
                if product.status == ProductStatus::Archived {
                    return vec![validation_failed_effect("cannot publish an archived product".to_string())];
                }

                if let Some(product) = state.products.get_mut(&product_id) {
                    product.status = ProductStatus::Published;
                    product.updated_at = env.clock.now();
                }

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductPublished { product_id })]
            },

            ProductAction::Archive { product_id } => {
                let Some(product) = state.products.get(&product_id) else {
                    return vec![validation_failed_effect(format!("unknown product {}", product_id.as_str()))];
                };
                if product.status == ProductStatus::Archived {
                    tracing::info!("Archive is a no-op: {} already archived", product_id.as_str());
                    return vec![Effect::None];
                }

                if let Some(product) = state.products.get_mut(&product_id) {
                    product.status = ProductStatus::Archived;
                    product.updated_at = env.clock.now();
                }

                let stream_id = StreamId::new(format!("product-{}", product_id.as_str()));
                vec![Self::persist_and_publish_effect(env, stream_id, ProductAction::ProductArchived { product_id })]
            },

            ProductAction::ProductCreated { .. }
            | ProductAction::ProductUpdated { .. }
            | ProductAction::ProductPublished { .. }
            | ProductAction::ProductArchived { .. }
            | ProductAction::ValidationFailed { .. } => vec![Effect::None],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::ProductId;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};
    use std::collections::HashMap;

    fn env() -> ProductEnvironment {
        ProductEnvironment::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()), Arc::new(SystemClock))
    }

    fn create(state: &mut ProductsState, reducer: &ProductReducer, environment: &ProductEnvironment, id: &str, slug: &str) {
        reducer.reduce(
            state,
            ProductAction::Create {
                product_id: ProductId::new(id.to_string()),
                name: "Widget".to_string(),
                slug: slug.to_string(),
                description: String::new(),
                brand_id: None,
                category_id: None,
                base_price_cents: 999,
                currency: "USD".to_string(),
                metadata: HashMap::new(),
            },
            environment,
        );
    }

    #[test]
    fn create_rejects_duplicate_slugs() {
        let mut state = ProductsState::new();
        let reducer = ProductReducer::new();
        let environment = env();

        create(&mut state, &reducer, &environment, "p1", "widget");
        let effects = &create(&mut state, &reducer, &environment, "p2", "widget");
        let _ = effects;

        assert_eq!(state.products.len(), 1);
    }

    #[test]
    fn slug_is_immutable_once_published() {
        let mut state = ProductsState::new();
        let reducer = ProductReducer::new();
        let environment = env();
        let product_id = ProductId::new("p1".to_string());

        create(&mut state, &reducer, &environment, "p1", "widget");
        reducer.reduce(&mut state, ProductAction::Publish { product_id: product_id.clone() }, &environment);

        let effects = reducer.reduce(
            &mut state,
            ProductAction::Update {
                product_id: product_id.clone(),
                name: None,
                slug: Some("new-slug".to_string()),
                description: None,
                base_price_cents: None,
                metadata: None,
            },
            &environment,
        );

        assert_eq!(effects.len(), 1);
        assert_eq!(state.get(&product_id).expect("exists").slug, "widget");
    }

    #[test]
    fn archive_hides_from_published_listing() {
        let mut state = ProductsState::new();
        let reducer = ProductReducer::new();
        let environment = env();
        let product_id = ProductId::new("p1".to_string());

        create(&mut state, &reducer, &environment, "p1", "widget");
        reducer.reduce(&mut state, ProductAction::Publish { product_id: product_id.clone() }, &environment);
        assert_eq!(state.published().len(), 1);

        reducer.reduce(&mut state, ProductAction::Archive { product_id: product_id.clone() }, &environment);
        assert_eq!(state.published().len(), 0);
        assert!(state.get(&product_id).is_some());
    }

    #[test]
    fn adding_a_primary_image_demotes_the_previous_one() {
        let mut state = ProductsState::new();
        let reducer = ProductReducer::new();
        let environment = env();
        let product_id = ProductId::new("p1".to_string());
        create(&mut state, &reducer, &environment, "p1", "widget");

        reducer.reduce(
            &mut state,
            ProductAction::AddImage {
                product_id: product_id.clone(),
                image: crate::types::ProductImage { url: "a.png".to_string(), sort_order: 0, is_primary: true },
            },
            &environment,
        );
        reducer.reduce(
            &mut state,
            ProductAction::AddImage {
                product_id: product_id.clone(),
                image: crate::types::ProductImage { url: "b.png".to_string(), sort_order: 1, is_primary: true },
            },
            &environment,
        );

        let product = state.get(&product_id).expect("exists");
        assert_eq!(product.images.iter().filter(|i| i.is_primary).count(), 1);
        assert!(product.images.last().expect("has image").is_primary);
    }
}
