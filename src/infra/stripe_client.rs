use std::collections::HashMap;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::app_error::{AppError, AppResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: STRIPE_API_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<StripeCustomer>> {
        let list: StripeList<StripeCustomer> = self
            .get("/customers", &[("email", email), ("limit", "1")])
            .await?;
        Ok(list.data.into_iter().next())
    }

    pub async fn create_customer(
        &self,
        email: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeCustomer> {
        let mut params = vec![("email".to_string(), email.to_string())];
        push_metadata(&mut params, "metadata", metadata);

        self.post("/customers", &params).await
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    /// Embedded subscription checkout with promotion code entry enabled.
    pub async fn create_embedded_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        return_url: &str,
        client_reference_id: &str,
    ) -> AppResult<StripeCheckoutSession> {
        let params = vec![
            ("ui_mode".to_string(), "embedded".to_string()),
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("allow_promotion_codes".to_string(), "true".to_string()),
            ("return_url".to_string(), return_url.to_string()),
            (
                "client_reference_id".to_string(),
                client_reference_id.to_string(),
            ),
            (
                "subscription_data[metadata][user_id]".to_string(),
                client_reference_id.to_string(),
            ),
        ];

        self.post("/checkout/sessions", &params).await
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn get_price(&self, price_id: &str) -> AppResult<StripePrice> {
        self.get(&format!("/prices/{}", price_id), &[]).await
    }

    pub async fn get_product(&self, product_id: &str) -> AppResult<StripeProduct> {
        self.get(&format!("/products/{}", product_id), &[]).await
    }

    /// Active promotion code with this exact customer-facing code, if any.
    pub async fn find_promotion_code(&self, code: &str) -> AppResult<Option<StripePromotionCode>> {
        let list: StripeList<StripePromotionCode> = self
            .get(
                "/promotion_codes",
                &[
                    ("code", code),
                    ("active", "true"),
                    ("limit", "1"),
                    ("expand[]", "data.coupon.applies_to"),
                ],
            )
            .await?;
        Ok(list.data.into_iter().next())
    }

    // ========================================================================
    // Setup Intents
    // ========================================================================

    pub async fn create_setup_intent(
        &self,
        customer_id: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeSetupIntent> {
        let mut params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("usage".to_string(), "off_session".to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        push_metadata(&mut params, "metadata", metadata);

        self.post("/setup_intents", &params).await
    }

    pub async fn get_setup_intent(&self, setup_intent_id: &str) -> AppResult<StripeSetupIntent> {
        self.get(&format!("/setup_intents/{}", setup_intent_id), &[])
            .await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        payment_method_id: &str,
        promotion_code_id: Option<&str>,
        coupon_id: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeSubscription> {
        let mut params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("items[0][price]".to_string(), price_id.to_string()),
            (
                "default_payment_method".to_string(),
                payment_method_id.to_string(),
            ),
        ];
        if let Some(promo) = promotion_code_id {
            params.push(("discounts[0][promotion_code]".to_string(), promo.to_string()));
        } else if let Some(coupon) = coupon_id {
            params.push(("discounts[0][coupon]".to_string(), coupon.to_string()));
        }
        push_metadata(&mut params, "metadata", metadata);

        self.post("/subscriptions", &params).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        self.get(&format!("/subscriptions/{}", subscription_id), &[])
            .await
    }

    /// Cancel immediately.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    /// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
    /// against the raw request body.
    pub fn verify_webhook_signature(
        payload: &[u8],
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
        now: i64,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidSignature("Missing timestamp in signature".into()))?;

        if signatures.is_empty() {
            return Err(AppError::InvalidSignature("Missing signature".into()));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected))
        {
            return Err(AppError::InvalidSignature("Invalid signature".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidSignature("Invalid timestamp".into()))?;
        if now.abs_diff(ts) > tolerance_secs.max(0) as u64 {
            return Err(AppError::InvalidSignature(
                "Timestamp outside tolerance".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Provider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

/// Missing objects and rejected requests will not succeed on retry; rate
/// limits and server errors may.
fn classify_error(status: StatusCode, body: &str) -> AppError {
    let parsed = serde_json::from_str::<StripeErrorResponse>(body).ok();
    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound;
    }
    match parsed {
        Some(error) if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS => {
            AppError::InvalidInput(format!(
                "Stripe error: {}",
                error.error.message.unwrap_or(error.error.error_type)
            ))
        }
        _ => AppError::Provider(format!("Stripe API error: {}", status)),
    }
}

fn push_metadata(
    params: &mut Vec<(String, String)>,
    prefix: &str,
    metadata: &HashMap<String, String>,
) {
    let mut entries: Vec<_> = metadata.iter().collect();
    entries.sort();
    for (key, value) in entries {
        params.push((format!("{}[{}]", prefix, key), value.clone()));
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub product: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripePriceRecurring>,
}

#[derive(Debug, Deserialize)]
pub struct StripePriceRecurring {
    pub interval: String,
}

#[derive(Debug, Deserialize)]
pub struct StripePromotionCode {
    pub id: String,
    pub code: String,
    pub active: bool,
    pub expires_at: Option<i64>,
    pub coupon: StripeCoupon,
}

#[derive(Debug, Deserialize)]
pub struct StripeCoupon {
    pub id: String,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    #[serde(default = "default_true")]
    pub valid: bool,
    pub redeem_by: Option<i64>,
    #[serde(default)]
    pub applies_to: Option<StripeCouponAppliesTo>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StripeCouponAppliesTo {
    #[serde(default)]
    pub products: Option<Vec<String>>,
    #[serde(default)]
    pub prices: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSetupIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: Option<i64>,
    pub items: StripeSubscriptionItems,
}

impl StripeSubscription {
    /// Get the first price ID from the subscription items
    pub fn price_id(&self) -> Option<String> {
        self.items.data.first().map(|item| item.price.id.clone())
    }

    /// Period end, read from the first item on API versions that moved it there.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePrice,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}
