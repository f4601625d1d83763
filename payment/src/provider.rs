//! Provider capability enum.
//!
//! Per the spec this is modeled, this is a closed set of variants
//! dispatched through an inherent match — never a `dyn` trait object chosen
//! by runtime reflection. Adding a provider means adding a variant here,
//! not registering an implementation somewhere else.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of initiating a payment with a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// Funds captured immediately.
    Succeeded {
        /// Provider-assigned reference.
        reference: String,
    },
    /// Accepted, settlement pending a webhook.
    Processing {
        /// Provider-assigned reference.
        reference: String,
    },
    /// Declined or errored synchronously.
    Failed {
        /// Reason reported by the provider.
        reason: String,
    },
}

/// A payment method token recognized as a simulated decline, for exercising
/// the failure path without a real provider sandbox.
const DECLINED_METHOD: &str = "declined-card";

/// The set of payment providers this service can route to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentProvider {
    /// Card-network style provider: settles synchronously.
    StripeLike,
    /// Redirect/wallet style provider: always settles asynchronously via
    /// webhook.
    PayPalLike,
    /// In-process provider for tests and local development.
    Mock,
}

impl PaymentProvider {
    /// Selects a provider by its configured name. Unknown names fall back
    /// to `Mock` rather than failing startup, since this is the
    /// development default.
    #[must_use]
    pub fn from_config_name(name: &str) -> Self {
        match name {
            "stripe" => Self::StripeLike,
            "paypal" => Self::PayPalLike,
            _ => Self::Mock,
        }
    }

    /// The name recorded on persisted payment records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StripeLike => "stripe",
            Self::PayPalLike => "paypal",
            Self::Mock => "mock",
        }
    }

    /// Initiates a charge for `method`. Stripe-like and mock providers
    /// settle synchronously; PayPal-like always defers to a webhook.
    #[must_use]
    pub fn initiate(self, method: &str) -> ProviderOutcome {
        let reference = format!("{}-{}", self.name(), Uuid::new_v4());
        match self {
            Self::PayPalLike => ProviderOutcome::Processing { reference },
            Self::StripeLike | Self::Mock => {
                if method == DECLINED_METHOD {
                    ProviderOutcome::Failed { reason: "card declined".to_string() }
                } else {
                    ProviderOutcome::Succeeded { reference }
                }
            },
        }
    }

    /// Refunds a previously captured payment. Every provider here treats
    /// refund as synchronous and unconditionally successful; a real
    /// integration would surface provider-side failures too.
    #[must_use]
    pub const fn refund(self, _reference: &str) -> Result<(), &'static str> {
        Ok(())
    }

    /// Cancels a payment that hasn't settled. Synchronous for all
    /// providers here.
    #[must_use]
    pub const fn cancel(self, _reference: &str) -> Result<(), &'static str> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn stripe_like_settles_synchronously() {
        match PaymentProvider::StripeLike.initiate("card") {
            ProviderOutcome::Succeeded { .. } => {},
            other => panic!("expected synchronous success, got {other:?}"),
        }
    }

    #[test]
    fn stripe_like_declines_the_sentinel_method() {
        match PaymentProvider::StripeLike.initiate(DECLINED_METHOD) {
            ProviderOutcome::Failed { .. } => {},
            other => panic!("expected synchronous failure, got {other:?}"),
        }
    }

    #[test]
    fn paypal_like_always_defers_to_a_webhook() {
        match PaymentProvider::PayPalLike.initiate("card") {
            ProviderOutcome::Processing { .. } => {},
            other => panic!("expected processing, got {other:?}"),
        }
    }

    #[test]
    fn unknown_config_name_falls_back_to_mock() {
        assert_eq!(PaymentProvider::from_config_name("square"), PaymentProvider::Mock);
    }
}
