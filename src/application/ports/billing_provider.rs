use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    app_error::AppResult,
    domain::entities::{
        billing_interval::BillingInterval, subscription_status::SubscriptionStatus,
        timestamp::from_unix,
    },
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Unique identifier for a customer in the billing provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing customer and the user id recorded in its metadata, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingCustomer {
    pub id: CustomerId,
    pub user_id: Option<String>,
}

/// Recurring price of a plan. Amounts are in minor units (cents).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceInfo {
    pub id: String,
    pub product_id: String,
    pub unit_amount: i64,
    pub currency: String,
    pub interval: BillingInterval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
}

/// Discount rule behind a promotion code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CouponInfo {
    pub id: String,
    pub percent_off: Option<f64>,
    /// Fixed discount in minor units.
    pub amount_off: Option<i64>,
    pub valid: bool,
    pub redeem_by: Option<i64>,
    /// `None` when the coupon has no product restriction.
    pub applies_to_products: Option<Vec<String>>,
    /// `None` when the coupon has no price restriction. An empty list allows no price.
    pub applies_to_prices: Option<Vec<String>>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionCodeInfo {
    pub id: String,
    pub code: String,
    pub active: bool,
    pub expires_at: Option<i64>,
    pub coupon: CouponInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetupIntentInfo {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl SetupIntentInfo {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub id: String,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<i64>,
}

impl SubscriptionInfo {
    pub fn renews_at(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.and_then(from_unix)
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: CustomerId,
    pub price_id: String,
    pub payment_method_id: String,
    pub promotion_code_id: Option<String>,
    pub coupon_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub customer_id: CustomerId,
    pub price_id: String,
    pub user_id: String,
    pub return_url: String,
}

/// Embedded checkout session handed to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResult {
    pub id: String,
    pub client_secret: String,
}

// ============================================================================
// Port Trait
// ============================================================================

/// Commands and lookups against the payment processor.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    /// Look up a customer by email, creating one tagged with the user id when absent.
    async fn find_or_create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> AppResult<BillingCustomer>;

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> AppResult<CheckoutSessionResult>;

    async fn get_price(&self, price_id: &str) -> AppResult<PriceInfo>;

    async fn get_product(&self, product_id: &str) -> AppResult<ProductInfo>;

    /// Resolve a customer-facing code. `None` when no active code matches.
    async fn find_promotion_code(&self, code: &str) -> AppResult<Option<PromotionCodeInfo>>;

    async fn create_setup_intent(
        &self,
        customer_id: &CustomerId,
        metadata: HashMap<String, String>,
    ) -> AppResult<SetupIntentInfo>;

    async fn get_setup_intent(&self, setup_intent_id: &str) -> AppResult<SetupIntentInfo>;

    async fn create_subscription(&self, input: NewSubscription) -> AppResult<SubscriptionInfo>;

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionInfo>;

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()>;
}
