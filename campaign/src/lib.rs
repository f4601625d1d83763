//! Campaign service: promo/coupon catalog with a draft → active →
//! paused/archived lifecycle and subtotal-based discount computation,
//! event-sourced through the shared `EventStore`/`EventBus` abstractions.

pub mod discount;
pub mod handlers;
pub mod reducer;
pub mod router;
pub mod types;

pub use reducer::{CampaignEnvironment, CampaignReducer};
pub use types::{CampaignAction, CampaignId, CampaignsState};
