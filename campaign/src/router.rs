//! HTTP router for the campaign service.

use crate::handlers;
use crate::reducer::{CampaignEnvironment, CampaignReducer};
use crate::types::{CampaignAction, CampaignsState};
use axum::routing::{get, post};
use axum::Router;
use composable_rust_runtime::Store;
use std::sync::Arc;

/// Builds the campaign service's router. `GET` routes are public, reached
/// through the gateway without authentication; lifecycle routes require an
/// admin `CurrentUser`; `/internal/*` is service-to-service only and never
/// crosses the gateway.
pub fn campaign_router(
    store: Arc<Store<CampaignsState, CampaignAction, CampaignEnvironment, CampaignReducer>>,
) -> Router {
    Router::new()
        .route("/campaigns", get(handlers::list_campaigns).post(handlers::create_campaign))
        .route("/campaigns/:id", get(handlers::get_campaign))
        .route("/campaigns/:id/activate", post(handlers::activate_campaign))
        .route("/campaigns/:id/pause", post(handlers::pause_campaign))
        .route("/campaigns/:id/archive", post(handlers::archive_campaign))
        .route("/internal/discounts/apply", post(handlers::apply_discount))
        .with_state(store)
}
