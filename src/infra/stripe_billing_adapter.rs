use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingCustomer, BillingProviderPort, CheckoutSessionRequest, CheckoutSessionResult, CouponInfo, CustomerId,
        NewSubscription, PriceInfo, ProductInfo, PromotionCodeInfo, SetupIntentInfo,
        SubscriptionInfo,
    },
    domain::entities::{
        billing_interval::BillingInterval, subscription_status::SubscriptionStatus,
    },
    infra::stripe_client::{
        StripeClient, StripeCustomer, StripePrice, StripePromotionCode, StripeSetupIntent, StripeSubscription,
    },
};

/// Adapter that wraps StripeClient to implement BillingProviderPort.
#[derive(Clone)]
pub struct StripeBillingAdapter {
    client: StripeClient,
}

impl StripeBillingAdapter {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: StripeClient::new(secret_key),
        }
    }

    fn map_customer(customer: StripeCustomer) -> BillingCustomer {
        let user_id = customer
            .metadata
            .get("user_id")
            .filter(|v| !v.is_empty())
            .cloned();
        BillingCustomer {
            id: CustomerId::new(customer.id),
            user_id,
        }
    }

    fn map_price(price: StripePrice) -> PriceInfo {
        let interval = price
            .recurring
            .as_ref()
            .map(|r| BillingInterval::from_stripe(&r.interval))
            .unwrap_or_default();
        PriceInfo {
            id: price.id,
            product_id: price.product,
            unit_amount: price.unit_amount.unwrap_or(0),
            currency: price.currency,
            interval,
        }
    }

    fn map_promotion_code(promo: StripePromotionCode) -> PromotionCodeInfo {
        let coupon = promo.coupon;
        let (products, prices) = match coupon.applies_to {
            Some(applies_to) => (applies_to.products, applies_to.prices),
            None => (None, None),
        };
        PromotionCodeInfo {
            id: promo.id,
            code: promo.code,
            active: promo.active,
            expires_at: promo.expires_at,
            coupon: CouponInfo {
                id: coupon.id,
                percent_off: coupon.percent_off,
                amount_off: coupon.amount_off,
                valid: coupon.valid,
                redeem_by: coupon.redeem_by,
                applies_to_products: products,
                applies_to_prices: prices,
                metadata: coupon.metadata,
            },
        }
    }

    fn map_setup_intent(intent: StripeSetupIntent) -> SetupIntentInfo {
        SetupIntentInfo {
            id: intent.id,
            client_secret: intent.client_secret,
            status: intent.status,
            customer_id: intent.customer,
            payment_method_id: intent.payment_method,
            metadata: intent.metadata,
        }
    }

    fn map_subscription(sub: StripeSubscription) -> SubscriptionInfo {
        SubscriptionInfo {
            price_id: sub.price_id(),
            current_period_end: sub.period_end(),
            status: SubscriptionStatus::from_stripe(&sub.status),
            customer_id: CustomerId::new(sub.customer),
            id: sub.id,
        }
    }
}

#[async_trait]
impl BillingProviderPort for StripeBillingAdapter {
    // ========================================================================
    // Customer Management
    // ========================================================================

    async fn find_or_create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> AppResult<BillingCustomer> {
        if let Some(existing) = self.client.find_customer_by_email(email).await? {
            return Ok(Self::map_customer(existing));
        }

        let metadata = HashMap::from([("user_id".to_string(), user_id.to_string())]);
        let customer = self.client.create_customer(email, &metadata).await?;
        tracing::info!(customer_id = %customer.id, user_id = %user_id, "Created Stripe customer");
        Ok(Self::map_customer(customer))
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> AppResult<CheckoutSessionResult> {
        let session = self
            .client
            .create_embedded_checkout_session(
                request.customer_id.as_str(),
                &request.price_id,
                &request.return_url,
                &request.user_id,
            )
            .await?;

        let client_secret = session.client_secret.ok_or_else(|| {
            AppError::Provider("Checkout session has no client secret".into())
        })?;

        Ok(CheckoutSessionResult {
            id: session.id,
            client_secret,
        })
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    async fn get_price(&self, price_id: &str) -> AppResult<PriceInfo> {
        let price = self.client.get_price(price_id).await?;
        Ok(Self::map_price(price))
    }

    async fn get_product(&self, product_id: &str) -> AppResult<ProductInfo> {
        let product = self.client.get_product(product_id).await?;
        Ok(ProductInfo {
            id: product.id,
            name: product.name,
        })
    }

    async fn find_promotion_code(&self, code: &str) -> AppResult<Option<PromotionCodeInfo>> {
        let promo = self.client.find_promotion_code(code).await?;
        Ok(promo.map(Self::map_promotion_code))
    }

    // ========================================================================
    // Setup Intents
    // ========================================================================

    async fn create_setup_intent(
        &self,
        customer_id: &CustomerId,
        metadata: HashMap<String, String>,
    ) -> AppResult<SetupIntentInfo> {
        let intent = self
            .client
            .create_setup_intent(customer_id.as_str(), &metadata)
            .await?;
        Ok(Self::map_setup_intent(intent))
    }

    async fn get_setup_intent(&self, setup_intent_id: &str) -> AppResult<SetupIntentInfo> {
        let intent = self.client.get_setup_intent(setup_intent_id).await?;
        Ok(Self::map_setup_intent(intent))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    async fn create_subscription(&self, input: NewSubscription) -> AppResult<SubscriptionInfo> {
        let sub = self
            .client
            .create_subscription(
                input.customer_id.as_str(),
                &input.price_id,
                &input.payment_method_id,
                input.promotion_code_id.as_deref(),
                input.coupon_id.as_deref(),
                &input.metadata,
            )
            .await?;
        Ok(Self::map_subscription(sub))
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionInfo> {
        let sub = self.client.get_subscription(subscription_id).await?;
        Ok(Self::map_subscription(sub))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        self.client.cancel_subscription(subscription_id).await?;
        Ok(())
    }
}
