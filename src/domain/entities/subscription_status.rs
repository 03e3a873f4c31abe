use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Subscription status as stored in the subscription record.
///
/// Most values mirror what Stripe reports. `PaymentFailed` and `SetupFailed`
/// are local values written when a trial authorization or trial setup fails.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    #[strum(to_string = "canceled", serialize = "cancelled")]
    Canceled,
    PaymentFailed,
    SetupFailed,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
}

impl SubscriptionStatus {
    /// Convert from a Stripe subscription status string.
    /// Unknown values map to `Incomplete` so access is never granted by default.
    pub fn from_stripe(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "unpaid" => SubscriptionStatus::Unpaid,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Returns true if the user should have access to paid features.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Statuses that stamp `unpaidAt` when entered.
    pub fn is_delinquent(&self) -> bool {
        matches!(self, SubscriptionStatus::Unpaid | SubscriptionStatus::PastDue)
    }
}
