use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    billing_interval::BillingInterval,
    plan_type::PlanType,
    subscription_status::SubscriptionStatus,
    timestamp::{format_timestamp, parse_timestamp},
};

// Hash field names of the subscription record.
pub const PLAN: &str = "plan";
pub const PLAN_TYPE: &str = "planType";
pub const STATUS: &str = "status";
pub const AMOUNT: &str = "amount";
pub const INTERVAL: &str = "interval";
pub const PRICE_ID: &str = "priceId";
pub const PROMOTION_CODE: &str = "promotionCode";
pub const PURCHASE_DATE: &str = "purchaseDate";
pub const RENEWAL_DATE: &str = "renewalDate";
pub const LAST_UPDATED: &str = "lastUpdated";
pub const CANCELED_AT: &str = "canceledAt";
pub const CANCELLATION_REASON: &str = "cancellationReason";
pub const TRIAL_ENDED_AT: &str = "trialEndedAt";
pub const TRIAL_TO_ACTIVE_DATE: &str = "trialToActiveDate";
pub const UNPAID_AT: &str = "unpaidAt";
pub const LAST_PAYMENT_DATE: &str = "lastPaymentDate";
pub const INITIAL_PAYMENT_DATE: &str = "initialPaymentDate";
pub const PAYMENT_FAILED_AT: &str = "paymentFailedAt";
pub const SETUP_FAILED_AT: &str = "setupFailedAt";
pub const FAILURE_REASON: &str = "failureReason";
pub const STRIPE_CUSTOMER_ID: &str = "stripeCustomerId";
pub const STRIPE_SUBSCRIPTION_ID: &str = "stripeSubscriptionId";

/// Typed view of the subscription hash. Blank or unparseable fields read as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub plan: String,
    pub plan_type: PlanType,
    pub status: Option<SubscriptionStatus>,
    pub amount: f64,
    pub interval: Option<BillingInterval>,
    pub price_id: Option<String>,
    pub promotion_code: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub renewal_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_ended_at: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub payment_failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

impl SubscriptionRecord {
    /// Parse a stored hash. Returns `None` for an empty hash (no record).
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let text = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let stamp = |name: &str| fields.get(name).and_then(|v| parse_timestamp(v));

        Some(Self {
            plan: text(PLAN).unwrap_or_default(),
            plan_type: text(PLAN_TYPE)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            status: text(STATUS).and_then(|v| v.parse().ok()),
            amount: text(AMOUNT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            interval: text(INTERVAL).and_then(|v| v.parse().ok()),
            price_id: text(PRICE_ID),
            promotion_code: text(PROMOTION_CODE),
            purchase_date: stamp(PURCHASE_DATE),
            renewal_date: stamp(RENEWAL_DATE),
            last_updated: stamp(LAST_UPDATED),
            canceled_at: stamp(CANCELED_AT),
            trial_ended_at: stamp(TRIAL_ENDED_AT),
            last_payment_date: stamp(LAST_PAYMENT_DATE),
            payment_failed_at: stamp(PAYMENT_FAILED_AT),
            failure_reason: text(FAILURE_REASON),
            stripe_customer_id: text(STRIPE_CUSTOMER_ID),
            stripe_subscription_id: text(STRIPE_SUBSCRIPTION_ID),
        })
    }
}

/// Partial update of a subscription record.
///
/// Only the fields set on the builder are written; everything else in the
/// stored hash is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionUpdate {
    fields: Vec<(&'static str, String)>,
}

impl SubscriptionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: &'static str, value: String) -> Self {
        self.fields.retain(|(n, _)| *n != name);
        self.fields.push((name, value));
        self
    }

    pub fn status(self, status: SubscriptionStatus) -> Self {
        self.set(STATUS, status.to_string())
    }

    pub fn plan(self, name: &str, plan_type: PlanType) -> Self {
        self.set(PLAN, name.to_string())
            .set(PLAN_TYPE, plan_type.to_string())
    }

    pub fn amount(self, amount: f64) -> Self {
        self.set(AMOUNT, amount.to_string())
    }

    pub fn interval(self, interval: BillingInterval) -> Self {
        self.set(INTERVAL, interval.to_string())
    }

    pub fn stripe_ids(self, customer_id: &str, subscription_id: &str) -> Self {
        self.set(STRIPE_CUSTOMER_ID, customer_id.to_string())
            .set(STRIPE_SUBSCRIPTION_ID, subscription_id.to_string())
    }

    pub fn last_updated(self, at: DateTime<Utc>) -> Self {
        self.stamp(LAST_UPDATED, at)
    }

    /// Write an ISO timestamp into one of the date fields.
    pub fn stamp(self, name: &'static str, at: DateTime<Utc>) -> Self {
        self.set(name, format_timestamp(at))
    }

    /// Write a free-form text field (reasons, identifiers).
    pub fn text(self, name: &'static str, value: impl Into<String>) -> Self {
        self.set(name, value.into())
    }

    /// Clear a field to the empty string.
    pub fn clear(self, name: &'static str) -> Self {
        self.set(name, String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn into_fields(self) -> Vec<(String, String)> {
        self.fields
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    }
}
