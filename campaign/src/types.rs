//! Core domain types for the campaign (promo/coupon) catalog.
//!
//! A campaign discounts a checkout's subtotal when it is `active`, the
//! current time falls within its `[start_date, end_date]` window, and it
//! hasn't exhausted `max_usage_count`. Campaigns with a `code` are applied
//! only when a caller presents that code; campaigns without one are
//! eligible for automatic selection during checkout (see
//! `select_automatic_discount` in `discount.rs`).

use chrono::{DateTime, Utc};
use composable_rust_macros::{Action, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a campaign.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(String);

impl CampaignId {
    /// Creates a `CampaignId` from an existing string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, random `CampaignId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("campaign-{}", Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a campaign's discount is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignType {
    /// `discount_value` is a percentage (0-100) of the subtotal.
    Percentage,
    /// `discount_value` is a fixed amount in the smallest currency unit.
    FixedAmount,
    /// Buy-X-get-Y; requires line-item knowledge the checkout call doesn't
    /// carry, so it is never chosen by automatic selection.
    BuyXGetY,
    /// Waives shipping; has no cents-denominated subtotal discount, so it
    /// is never chosen by automatic selection.
    FreeShipping,
}

/// Lifecycle status of a campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Created but not yet eligible to apply.
    Draft,
    /// Eligible to apply, subject to the date window and usage cap.
    Active,
    /// Temporarily suspended; resumes as `Active` on reactivation.
    Paused,
    /// Past its `end_date`; never re-activated.
    Expired,
    /// Retired by an admin; never re-activated.
    Archived,
}

/// A promo/coupon campaign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign identifier.
    pub campaign_id: CampaignId,
    /// Display name.
    pub name: String,
    /// Discount mechanism.
    pub campaign_type: CampaignType,
    /// Meaning depends on `campaign_type`: a percentage or a fixed cents amount.
    pub discount_value: i64,
    /// Minimum subtotal, in cents, required for this campaign to apply.
    pub min_order_amount_cents: Option<i64>,
    /// Cap on the computed discount, in cents.
    pub max_discount_amount_cents: Option<i64>,
    /// Coupon code required to apply this campaign; `None` means automatic.
    pub code: Option<String>,
    /// Maximum number of times this campaign may be applied.
    pub max_usage_count: u32,
    /// Number of times this campaign has been applied so far.
    pub current_usage_count: u32,
    /// Campaign becomes eligible at this time.
    pub start_date: DateTime<Utc>,
    /// Campaign stops being eligible after this time.
    pub end_date: DateTime<Utc>,
    /// Category ids this campaign restricts to; empty means unrestricted.
    pub applicable_categories: Vec<String>,
    /// Product ids this campaign restricts to; empty means unrestricted.
    pub applicable_products: Vec<String>,
    /// Lifecycle status.
    pub status: CampaignStatus,
}

impl Campaign {
    /// Whether this campaign is eligible to apply at `now`: `active`,
    /// within its date window, and under its usage cap.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && now >= self.start_date
            && now <= self.end_date
            && self.current_usage_count < self.max_usage_count
    }
}

/// Aggregate state for the whole campaign catalog.
#[derive(State, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CampaignsState {
    /// Campaigns, indexed by id.
    pub campaigns: HashMap<CampaignId, Campaign>,
    /// Coupon-code uniqueness index, indexed by code.
    pub codes: HashMap<String, CampaignId>,
    /// Discounts already resolved for a `checkout_id`, so `ApplyDiscount` is
    /// idempotent under re-execution (the saga step may retry).
    pub resolved_discounts: HashMap<String, (Option<CampaignId>, i64)>,
}

impl CampaignsState {
    /// Creates empty campaign catalog state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a campaign by id.
    #[must_use]
    pub fn get(&self, id: &CampaignId) -> Option<&Campaign> {
        self.campaigns.get(id)
    }

    /// Every campaign visible to public listing (not `draft` or `archived`).
    #[must_use]
    pub fn public(&self) -> Vec<&Campaign> {
        self.campaigns
            .values()
            .filter(|c| !matches!(c.status, CampaignStatus::Draft | CampaignStatus::Archived))
            .collect()
    }
}

/// Commands and events for the campaign aggregate.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum CampaignAction {
    // ========== Commands ==========
    /// Command: create a new campaign in `draft`.
    #[command]
    Create {
        /// Campaign identifier, assigned by the caller.
        campaign_id: CampaignId,
        /// Display name.
        name: String,
        /// Discount mechanism.
        campaign_type: CampaignType,
        /// Percentage or fixed cents amount, depending on `campaign_type`.
        discount_value: i64,
        /// Minimum subtotal required, in cents.
        min_order_amount_cents: Option<i64>,
        /// Cap on the computed discount, in cents.
        max_discount_amount_cents: Option<i64>,
        /// Coupon code; `None` means automatic.
        code: Option<String>,
        /// Maximum number of applications.
        max_usage_count: u32,
        /// Eligibility window start.
        start_date: DateTime<Utc>,
        /// Eligibility window end.
        end_date: DateTime<Utc>,
        /// Restricted categories; empty means unrestricted.
        applicable_categories: Vec<String>,
        /// Restricted products; empty means unrestricted.
        applicable_products: Vec<String>,
    },

    /// Command: move a campaign from `draft` or `paused` into `active`.
    #[command]
    Activate {
        /// Campaign to activate.
        campaign_id: CampaignId,
    },

    /// Command: temporarily suspend an `active` campaign.
    #[command]
    Pause {
        /// Campaign to pause.
        campaign_id: CampaignId,
    },

    /// Command: retire a campaign permanently.
    #[command]
    Archive {
        /// Campaign to archive.
        campaign_id: CampaignId,
    },

    /// Command: compute and apply the best eligible discount for a
    /// checkout's subtotal, incrementing usage on the campaign it picks (if
    /// any). Idempotent per `checkout_id`: re-issuing the same command for a
    /// `checkout_id` that already resolved returns the same discount without
    /// double-incrementing usage.
    #[command]
    ApplyDiscount {
        /// Checkout session this discount is being computed for.
        checkout_id: String,
        /// Subtotal, in cents, to discount against.
        subtotal_cents: i64,
        /// Coupon code presented by the caller, if any.
        code: Option<String>,
    },

    // ========== Events ==========
    /// Event: a campaign was created.
    #[event]
    CampaignCreated {
        /// Campaign that was created.
        campaign_id: CampaignId,
    },

    /// Event: a campaign was activated.
    #[event]
    CampaignActivated {
        /// Campaign that was activated.
        campaign_id: CampaignId,
    },

    /// Event: a campaign was paused.
    #[event]
    CampaignPaused {
        /// Campaign that was paused.
        campaign_id: CampaignId,
    },

    /// Event: a campaign was archived.
    #[event]
    CampaignArchived {
        /// Campaign that was archived.
        campaign_id: CampaignId,
    },

    /// Event: a discount was resolved for a checkout.
    #[event]
    DiscountApplied {
        /// Checkout session the discount applies to.
        checkout_id: String,
        /// Campaign that was applied, if any.
        campaign_id: Option<CampaignId>,
        /// Resulting discount, in cents.
        discount_cents: i64,
    },

    /// Event: a command failed validation.
    #[event]
    ValidationFailed {
        /// Human-readable reason.
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(status: CampaignStatus, usage: u32, max_usage: u32) -> Campaign {
        let now = Utc::now();
        Campaign {
            campaign_id: CampaignId::generate(),
            name: "Test".to_string(),
            campaign_type: CampaignType::Percentage,
            discount_value: 10,
            min_order_amount_cents: None,
            max_discount_amount_cents: None,
            code: None,
            max_usage_count: max_usage,
            current_usage_count: usage,
            start_date: now - chrono::Duration::days(1),
            end_date: now + chrono::Duration::days(1),
            applicable_categories: Vec::new(),
            applicable_products: Vec::new(),
            status,
        }
    }

    #[test]
    fn active_campaign_under_cap_is_eligible() {
        assert!(campaign(CampaignStatus::Active, 0, 10).is_eligible(Utc::now()));
    }

    #[test]
    fn exhausted_campaign_is_not_eligible() {
        assert!(!campaign(CampaignStatus::Active, 10, 10).is_eligible(Utc::now()));
    }

    #[test]
    fn paused_campaign_is_not_eligible() {
        assert!(!campaign(CampaignStatus::Paused, 0, 10).is_eligible(Utc::now()));
    }
}
