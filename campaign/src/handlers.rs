//! HTTP handlers for the campaign (promo/coupon) service.
//!
//! `GET /campaigns` is public. Every mutating lifecycle route requires an
//! authenticated admin. `POST /internal/discounts/apply` is the
//! service-to-service contract checkout's checkout saga calls; it carries no
//! `CurrentUser` since it never crosses the gateway.

use crate::reducer::{CampaignEnvironment, CampaignReducer};
use crate::types::{Campaign, CampaignAction, CampaignId, CampaignType, CampaignsState};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use composable_rust_runtime::Store;
use composable_rust_web::extractors::{CurrentUser, Role};
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

type CampaignStore = Store<CampaignsState, CampaignAction, CampaignEnvironment, CampaignReducer>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::forbidden("admin role required"))
    }
}

/// A campaign as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignResponse {
    /// Campaign identifier.
    pub campaign_id: String,
    /// Display name.
    pub name: String,
    /// Discount mechanism, lowercased.
    pub campaign_type: String,
    /// Percentage or fixed cents amount, depending on `campaign_type`.
    pub discount_value: i64,
    /// Coupon code, if the campaign isn't automatic.
    pub code: Option<String>,
    /// Lifecycle status, lowercased.
    pub status: String,
    /// Number of times this campaign has been applied so far.
    pub current_usage_count: u32,
    /// Maximum number of times this campaign may be applied.
    pub max_usage_count: u32,
    /// Eligibility window start.
    pub start_date: DateTime<Utc>,
    /// Eligibility window end.
    pub end_date: DateTime<Utc>,
}

impl From<&Campaign> for CampaignResponse {
    fn from(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.campaign_id.as_str().to_string(),
            name: campaign.name.clone(),
            campaign_type: format!("{:?}", campaign.campaign_type).to_lowercase(),
            discount_value: campaign.discount_value,
            code: campaign.code.clone(),
            status: format!("{:?}", campaign.status).to_lowercase(),
            current_usage_count: campaign.current_usage_count,
            max_usage_count: campaign.max_usage_count,
            start_date: campaign.start_date,
            end_date: campaign.end_date,
        }
    }
}

/// List every campaign visible to the public (not `draft` or `archived`).
///
/// # Endpoint
///
/// `GET /campaigns`
pub async fn list_campaigns(State(store): State<Arc<CampaignStore>>) -> Json<Vec<CampaignResponse>> {
    let state = store.state(Clone::clone).await;
    Json(state.public().into_iter().map(CampaignResponse::from).collect())
}

/// Fetch one campaign by id.
///
/// # Endpoint
///
/// `GET /campaigns/:id`
pub async fn get_campaign(
    State(store): State<Arc<CampaignStore>>,
    Path(campaign_id): Path<String>,
) -> Result<Json<CampaignResponse>, AppError> {
    let state = store.state(Clone::clone).await;
    let campaign = state
        .get(&CampaignId::new(campaign_id.clone()))
        .ok_or_else(|| AppError::not_found("Campaign", &campaign_id))?;
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Request body for `POST /campaigns`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    /// Display name.
    pub name: String,
    /// Discount mechanism.
    pub campaign_type: CampaignType,
    /// Percentage or fixed cents amount, depending on `campaign_type`.
    pub discount_value: i64,
    /// Minimum subtotal required, in cents.
    #[serde(default)]
    pub min_order_amount_cents: Option<i64>,
    /// Cap on the computed discount, in cents.
    #[serde(default)]
    pub max_discount_amount_cents: Option<i64>,
    /// Coupon code; absent means automatic.
    #[serde(default)]
    pub code: Option<String>,
    /// Maximum number of applications.
    pub max_usage_count: u32,
    /// Eligibility window start.
    pub start_date: DateTime<Utc>,
    /// Eligibility window end.
    pub end_date: DateTime<Utc>,
    /// Restricted categories; empty means unrestricted.
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    /// Restricted products; empty means unrestricted.
    #[serde(default)]
    pub applicable_products: Vec<String>,
}

/// Create a new campaign in `draft`. Admin-only.
///
/// # Endpoint
///
/// `POST /campaigns`
pub async fn create_campaign(
    State(store): State<Arc<CampaignStore>>,
    user: CurrentUser,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<Json<CampaignResponse>, AppError> {
    require_admin(&user)?;

    let campaign_id = CampaignId::generate();
    let action = CampaignAction::Create {
        campaign_id: campaign_id.clone(),
        name: request.name,
        campaign_type: request.campaign_type,
        discount_value: request.discount_value,
        min_order_amount_cents: request.min_order_amount_cents,
        max_discount_amount_cents: request.max_discount_amount_cents,
        code: request.code,
        max_usage_count: request.max_usage_count,
        start_date: request.start_date,
        end_date: request.end_date,
        applicable_categories: request.applicable_categories,
        applicable_products: request.applicable_products,
    };

    let result = store
        .send_and_wait_for(action, |a| matches!(a, CampaignAction::ValidationFailed { .. }), COMMAND_TIMEOUT)
        .await;
    if let Ok(CampaignAction::ValidationFailed { error }) = result {
        return Err(AppError::validation(error));
    }

    let state = store.state(Clone::clone).await;
    let campaign = state.get(&campaign_id).ok_or_else(|| AppError::internal("campaign not found after create"))?;
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Move a campaign into `active`. Admin-only.
///
/// # Endpoint
///
/// `POST /campaigns/:id/activate`
pub async fn activate_campaign(
    State(store): State<Arc<CampaignStore>>,
    user: CurrentUser,
    Path(campaign_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let result = store
        .send_and_wait_for(
            CampaignAction::Activate { campaign_id: CampaignId::new(campaign_id) },
            |a| matches!(a, CampaignAction::ValidationFailed { .. }),
            COMMAND_TIMEOUT,
        )
        .await;
    if let Ok(CampaignAction::ValidationFailed { error }) = result {
        return Err(AppError::conflict(error));
    }

    Ok(Json(serde_json::json!({ "activated": true })))
}

/// Suspend an `active` campaign. Admin-only.
///
/// # Endpoint
///
/// `POST /campaigns/:id/pause`
pub async fn pause_campaign(
    State(store): State<Arc<CampaignStore>>,
    user: CurrentUser,
    Path(campaign_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let result = store
        .send_and_wait_for(
            CampaignAction::Pause { campaign_id: CampaignId::new(campaign_id) },
            |a| matches!(a, CampaignAction::ValidationFailed { .. }),
            COMMAND_TIMEOUT,
        )
        .await;
    if let Ok(CampaignAction::ValidationFailed { error }) = result {
        return Err(AppError::conflict(error));
    }

    Ok(Json(serde_json::json!({ "paused": true })))
}

/// Retire a campaign permanently. Admin-only.
///
/// # Endpoint
///
/// `POST /campaigns/:id/archive`
pub async fn archive_campaign(
    State(store): State<Arc<CampaignStore>>,
    user: CurrentUser,
    Path(campaign_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&user)?;

    let _ = store.send(CampaignAction::Archive { campaign_id: CampaignId::new(campaign_id) }).await;
    Ok(Json(serde_json::json!({ "archived": true })))
}

/// Request body for `POST /internal/discounts/apply`, matching checkout's
/// `DiscountRequest` exactly.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyDiscountRequest {
    /// Checkout session this discount is being computed for.
    pub checkout_id: String,
    /// Subtotal, in cents, to discount against.
    pub subtotal_cents: i64,
    /// Coupon code presented by the caller, if any. Checkout's own saga call
    /// never sends one today, so this defaults to `None`.
    #[serde(default)]
    pub code: Option<String>,
}

/// Response body for `POST /internal/discounts/apply`, matching checkout's
/// `DiscountResponse` exactly.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyDiscountResponse {
    /// Resulting discount, in cents.
    pub discount_cents: i64,
}

/// Resolve and apply the best eligible discount for a checkout's subtotal.
/// Internal, service-to-service only; non-fatal on the caller's side if this
/// call fails, so a validation failure here still returns a usable response
/// rather than blocking the checkout saga.
///
/// # Endpoint
///
/// `POST /internal/discounts/apply`
pub async fn apply_discount(
    State(store): State<Arc<CampaignStore>>,
    Json(request): Json<ApplyDiscountRequest>,
) -> Result<Json<ApplyDiscountResponse>, AppError> {
    let action = CampaignAction::ApplyDiscount {
        checkout_id: request.checkout_id.clone(),
        subtotal_cents: request.subtotal_cents,
        code: request.code,
    };

    let result = store
        .send_and_wait_for(action, |a| matches!(a, CampaignAction::DiscountApplied { .. }), COMMAND_TIMEOUT)
        .await;
    let discount_cents = match result {
        Ok(CampaignAction::DiscountApplied { discount_cents, .. }) => discount_cents,
        _ => {
            let state = store.state(Clone::clone).await;
            state.resolved_discounts.get(&request.checkout_id).map_or(0, |(_, discount_cents)| *discount_cents)
        },
    };

    Ok(Json(ApplyDiscountResponse { discount_cents }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use composable_rust_core::environment::SystemClock;
    use composable_rust_testing::mocks::{InMemoryEventBus, InMemoryEventStore};

    fn store() -> Arc<CampaignStore> {
        let environment = CampaignEnvironment::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(SystemClock),
        );
        Arc::new(Store::new(CampaignsState::new(), CampaignReducer::new(), environment))
    }

    fn admin() -> CurrentUser {
        CurrentUser { user_id: "admin-1".to_string(), email: None, role: Role::Admin }
    }

    fn customer() -> CurrentUser {
        CurrentUser { user_id: "user-1".to_string(), email: None, role: Role::Customer }
    }

    fn create_request() -> CreateCampaignRequest {
        let now = Utc::now();
        CreateCampaignRequest {
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
        }
    }

    #[tokio::test]
    async fn customers_cannot_create_campaigns() {
        let store = store();
        let result = create_campaign(State(store), customer(), Json(create_request())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_then_activate_shows_up_in_listing() {
        let store = store();
        let created =
            create_campaign(State(Arc::clone(&store)), admin(), Json(create_request())).await.expect("create ok");

        assert!(list_campaigns(State(Arc::clone(&store))).await.0.is_empty());

        activate_campaign(State(Arc::clone(&store)), admin(), Path(created.0.campaign_id.clone()))
            .await
            .expect("activate ok");

        assert_eq!(list_campaigns(State(store)).await.0.len(), 1);
    }

    #[tokio::test]
    async fn apply_discount_with_no_campaigns_returns_zero() {
        let store = store();
        let response = apply_discount(
            State(store),
            Json(ApplyDiscountRequest { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None }),
        )
        .await
        .expect("apply ok");

        assert_eq!(response.0.discount_cents, 0);
    }

    #[tokio::test]
    async fn apply_discount_against_an_active_campaign() {
        let store = store();
        let created =
            create_campaign(State(Arc::clone(&store)), admin(), Json(create_request())).await.expect("create ok");
        activate_campaign(State(Arc::clone(&store)), admin(), Path(created.0.campaign_id.clone()))
            .await
            .expect("activate ok");

        let response = apply_discount(
            State(store),
            Json(ApplyDiscountRequest { checkout_id: "c1".to_string(), subtotal_cents: 1000, code: None }),
        )
        .await
        .expect("apply ok");

        assert_eq!(response.0.discount_cents, 100);
    }
}
