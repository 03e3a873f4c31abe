//! Test data factories and webhook payload builders.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use crate::{
    application::ports::billing_provider::{
        CouponInfo, CustomerId, PriceInfo, ProductInfo, PromotionCodeInfo, SetupIntentInfo,
        SubscriptionInfo,
    },
    domain::entities::{
        billing_interval::BillingInterval, subscription_status::SubscriptionStatus,
    },
};

// ============================================================================
// Provider objects
// ============================================================================

/// Monthly price of 15.00 USD.
pub fn create_test_price(overrides: impl FnOnce(&mut PriceInfo)) -> PriceInfo {
    let mut price = PriceInfo {
        id: "price_test".to_string(),
        product_id: "prod_test".to_string(),
        unit_amount: 1500,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
    };
    overrides(&mut price);
    price
}

pub fn create_test_product(overrides: impl FnOnce(&mut ProductInfo)) -> ProductInfo {
    let mut product = ProductInfo {
        id: "prod_test".to_string(),
        name: "Standard Plan".to_string(),
    };
    overrides(&mut product);
    product
}

pub fn create_test_subscription_info(
    overrides: impl FnOnce(&mut SubscriptionInfo),
) -> SubscriptionInfo {
    let mut subscription = SubscriptionInfo {
        id: "sub_test".to_string(),
        customer_id: CustomerId::new("cus_1"),
        status: SubscriptionStatus::Active,
        price_id: Some("price_test".to_string()),
        current_period_end: None,
    };
    overrides(&mut subscription);
    subscription
}

/// Active code `SPRING` for 10% off with no restrictions.
pub fn create_test_promotion_code(
    overrides: impl FnOnce(&mut PromotionCodeInfo),
) -> PromotionCodeInfo {
    let mut promo = PromotionCodeInfo {
        id: "promo_1".to_string(),
        code: "SPRING".to_string(),
        active: true,
        expires_at: None,
        coupon: CouponInfo {
            id: "coupon_1".to_string(),
            percent_off: Some(10.0),
            valid: true,
            ..Default::default()
        },
    };
    overrides(&mut promo);
    promo
}

/// Succeeded setup intent for `user_42` on `price_std` with a saved card.
pub fn create_test_setup_intent(overrides: impl FnOnce(&mut SetupIntentInfo)) -> SetupIntentInfo {
    let mut intent = SetupIntentInfo {
        id: "seti_test".to_string(),
        client_secret: Some("seti_test_secret".to_string()),
        status: "succeeded".to_string(),
        customer_id: Some("cus_1".to_string()),
        payment_method_id: Some("pm_test".to_string()),
        metadata: HashMap::from([
            ("user_id".to_string(), "user_42".to_string()),
            ("price_id".to_string(), "price_std".to_string()),
        ]),
    };
    overrides(&mut intent);
    intent
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// Serialized Stripe event envelope around `object`.
pub fn event_body(
    id: &str,
    event_type: &str,
    created: i64,
    object: Value,
    previous_attributes: Option<Value>,
) -> Vec<u8> {
    let mut data = json!({ "object": object });
    if let Some(previous) = previous_attributes {
        data["previous_attributes"] = previous;
    }
    let event = json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": data,
    });
    serde_json::to_vec(&event).unwrap()
}

pub fn subscription_object(id: &str, customer: &str, status: &str) -> Value {
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": status,
        "items": { "object": "list", "data": [] },
    })
}

pub fn invoice_object(id: &str, customer: &str, subscription: &str, billing_reason: &str) -> Value {
    json!({
        "id": id,
        "object": "invoice",
        "customer": customer,
        "billing_reason": billing_reason,
        "parent": {
            "type": "subscription_details",
            "subscription_details": { "subscription": subscription },
        },
    })
}

/// `Stripe-Signature` header value for `payload` signed at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
