//! Pure discount-selection logic, kept separate from the reducer so it can
//! be unit-tested without an `Environment`.

use crate::types::{Campaign, CampaignType};
use chrono::{DateTime, Utc};

/// Computes the discount (in cents) a single campaign would contribute
/// against `subtotal_cents`, or `None` if the campaign doesn't apply (below
/// its minimum order amount, or a type that needs line-item knowledge this
/// subtotal-only computation doesn't have).
#[must_use]
pub fn discount_for_campaign(campaign: &Campaign, subtotal_cents: i64) -> Option<i64> {
    if let Some(min) = campaign.min_order_amount_cents {
        if subtotal_cents < min {
            return None;
        }
    }

    let raw_cents = match campaign.campaign_type {
        CampaignType::Percentage => subtotal_cents * campaign.discount_value / 100,
        CampaignType::FixedAmount => campaign.discount_value,
        CampaignType::BuyXGetY | CampaignType::FreeShipping => return None,
    };

    let capped = campaign.max_discount_amount_cents.map_or(raw_cents, |max| raw_cents.min(max));
    Some(capped.clamp(0, subtotal_cents))
}

/// Selects the best eligible campaign for a checkout, if any.
///
/// If `requested_code` is `Some`, only a campaign whose own `code` matches
/// is considered — a requested code never falls back to an automatic
/// campaign. If `requested_code` is `None`, only campaigns with no `code`
/// (automatic campaigns) are considered. Among eligible candidates, the one
/// yielding the largest discount wins.
#[must_use]
pub fn select_best_campaign<'a>(
    campaigns: impl Iterator<Item = &'a Campaign>,
    subtotal_cents: i64,
    requested_code: Option<&str>,
    now: DateTime<Utc>,
) -> Option<(&'a Campaign, i64)> {
    campaigns
        .filter(|campaign| campaign.is_eligible(now))
        .filter(|campaign| match (campaign.code.as_deref(), requested_code) {
            (Some(campaign_code), Some(requested)) => campaign_code == requested,
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => true,
        })
        .filter_map(|campaign| discount_for_campaign(campaign, subtotal_cents).map(|discount| (campaign, discount)))
        .max_by_key(|(_, discount)| *discount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignId, CampaignStatus};

    fn campaign(campaign_type: CampaignType, discount_value: i64, code: Option<&str>) -> Campaign {
        let now = Utc::now();
        Campaign {
            campaign_id: CampaignId::generate(),
            name: "Test".to_string(),
            campaign_type,
            discount_value,
            min_order_amount_cents: None,
            max_discount_amount_cents: None,
            code: code.map(str::to_string),
            max_usage_count: 1000,
            current_usage_count: 0,
            start_date: now - chrono::Duration::days(1),
            end_date: now + chrono::Duration::days(1),
            applicable_categories: Vec::new(),
            applicable_products: Vec::new(),
            status: CampaignStatus::Active,
        }
    }

    #[test]
    fn percentage_discount_is_capped_by_max() {
        let mut c = campaign(CampaignType::Percentage, 50, None);
        c.max_discount_amount_cents = Some(100);
        assert_eq!(discount_for_campaign(&c, 1000), Some(100));
    }

    #[test]
    fn below_minimum_order_amount_does_not_apply() {
        let mut c = campaign(CampaignType::FixedAmount, 500, None);
        c.min_order_amount_cents = Some(2000);
        assert_eq!(discount_for_campaign(&c, 1000), None);
    }

    #[test]
    fn buy_x_get_y_never_contributes_a_subtotal_discount() {
        let c = campaign(CampaignType::BuyXGetY, 1, None);
        assert_eq!(discount_for_campaign(&c, 1000), None);
    }

    #[test]
    fn requested_code_never_falls_back_to_an_automatic_campaign() {
        let automatic = campaign(CampaignType::Percentage, 10, None);
        let best = select_best_campaign(std::iter::once(&automatic), 1000, Some("SAVE10"), Utc::now());
        assert!(best.is_none());
    }

    #[test]
    fn best_of_several_eligible_campaigns_wins() {
        let small = campaign(CampaignType::FixedAmount, 100, None);
        let large = campaign(CampaignType::FixedAmount, 300, None);
        let (winner, discount) =
            select_best_campaign([&small, &large].into_iter(), 1000, None, Utc::now()).expect("one applies");
        assert_eq!(discount, 300);
        assert_eq!(winner.discount_value, 300);
    }
}
