//! Scripted billing provider for use case and route tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingCustomer, BillingProviderPort, CheckoutSessionRequest, CheckoutSessionResult, CustomerId,
        NewSubscription, PriceInfo, ProductInfo, PromotionCodeInfo, SetupIntentInfo,
        SubscriptionInfo,
    },
    domain::entities::subscription_status::SubscriptionStatus,
};

// ============================================================================
// FakeBillingProvider
// ============================================================================

/// Answers lookups from seeded catalogs and records every command it receives.
/// Unknown ids yield `NotFound`; `set_unavailable(true)` turns every call into
/// a provider error. `fail_cancel_with` makes the next cancel return the given error.
#[derive(Default)]
pub struct FakeBillingProvider {
    customers: Mutex<HashMap<String, BillingCustomer>>,
    prices: Mutex<HashMap<String, PriceInfo>>,
    products: Mutex<HashMap<String, ProductInfo>>,
    promotion_codes: Mutex<HashMap<String, PromotionCodeInfo>>,
    setup_intents: Mutex<HashMap<String, SetupIntentInfo>>,
    subscriptions: Mutex<HashMap<String, SubscriptionInfo>>,
    checkout_requests: Mutex<Vec<CheckoutSessionRequest>>,
    setup_intent_metadata: Mutex<Vec<HashMap<String, String>>>,
    created_subscriptions: Mutex<Vec<NewSubscription>>,
    canceled_subscriptions: Mutex<Vec<String>>,
    cancel_error: Mutex<Option<AppError>>,
    next_id: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, email: &str, customer_id: &str) -> Self {
        self.insert_customer(email, customer_id, None);
        self
    }

    /// Seed a customer whose metadata names its owning user.
    pub fn with_customer_owned_by(self, email: &str, customer_id: &str, user_id: &str) -> Self {
        self.insert_customer(email, customer_id, Some(user_id.to_string()));
        self
    }

    fn insert_customer(&self, email: &str, customer_id: &str, user_id: Option<String>) {
        self.customers.lock().unwrap().insert(
            email.to_string(),
            BillingCustomer {
                id: CustomerId::new(customer_id),
                user_id,
            },
        );
    }

    pub fn with_price(self, price: PriceInfo) -> Self {
        self.prices.lock().unwrap().insert(price.id.clone(), price);
        self
    }

    pub fn with_product(self, product: ProductInfo) -> Self {
        self.products
            .lock()
            .unwrap()
            .insert(product.id.clone(), product);
        self
    }

    pub fn with_promotion_code(self, promo: PromotionCodeInfo) -> Self {
        self.promotion_codes
            .lock()
            .unwrap()
            .insert(promo.code.clone(), promo);
        self
    }

    pub fn with_setup_intent(self, intent: SetupIntentInfo) -> Self {
        self.setup_intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent);
        self
    }

    pub fn with_subscription(self, subscription: SubscriptionInfo) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
        self
    }

    pub fn fail_cancel_with(self, error: AppError) -> Self {
        *self.cancel_error.lock().unwrap() = Some(error);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.checkout_requests.lock().unwrap().clone()
    }

    pub fn setup_intent_metadata(&self) -> Vec<HashMap<String, String>> {
        self.setup_intent_metadata.lock().unwrap().clone()
    }

    pub fn created_subscriptions(&self) -> Vec<NewSubscription> {
        self.created_subscriptions.lock().unwrap().clone()
    }

    pub fn canceled_subscriptions(&self) -> Vec<String> {
        self.canceled_subscriptions.lock().unwrap().clone()
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Provider("Stripe API error: 503".into()));
        }
        Ok(())
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}_test_{n}")
    }
}

#[async_trait]
impl BillingProviderPort for FakeBillingProvider {
    async fn find_or_create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> AppResult<BillingCustomer> {
        self.check()?;
        if let Some(existing) = self.customers.lock().unwrap().get(email) {
            return Ok(existing.clone());
        }
        let customer = BillingCustomer {
            id: CustomerId::new(self.generate_id("cus")),
            user_id: Some(user_id.to_string()),
        };
        self.customers
            .lock()
            .unwrap()
            .insert(email.to_string(), customer.clone());
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> AppResult<CheckoutSessionResult> {
        self.check()?;
        self.checkout_requests.lock().unwrap().push(request);
        let id = self.generate_id("cs");
        Ok(CheckoutSessionResult {
            client_secret: format!("{id}_secret"),
            id,
        })
    }

    async fn get_price(&self, price_id: &str) -> AppResult<PriceInfo> {
        self.check()?;
        self.prices
            .lock()
            .unwrap()
            .get(price_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn get_product(&self, product_id: &str) -> AppResult<ProductInfo> {
        self.check()?;
        self.products
            .lock()
            .unwrap()
            .get(product_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn find_promotion_code(&self, code: &str) -> AppResult<Option<PromotionCodeInfo>> {
        self.check()?;
        Ok(self
            .promotion_codes
            .lock()
            .unwrap()
            .get(code)
            .filter(|p| p.active)
            .cloned())
    }

    async fn create_setup_intent(
        &self,
        customer_id: &CustomerId,
        metadata: HashMap<String, String>,
    ) -> AppResult<SetupIntentInfo> {
        self.check()?;
        self.setup_intent_metadata
            .lock()
            .unwrap()
            .push(metadata.clone());
        let id = self.generate_id("seti");
        let intent = SetupIntentInfo {
            client_secret: Some(format!("{id}_secret")),
            id,
            status: "requires_payment_method".to_string(),
            customer_id: Some(customer_id.as_str().to_string()),
            payment_method_id: None,
            metadata,
        };
        self.setup_intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_setup_intent(&self, setup_intent_id: &str) -> AppResult<SetupIntentInfo> {
        self.check()?;
        self.setup_intents
            .lock()
            .unwrap()
            .get(setup_intent_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn create_subscription(&self, input: NewSubscription) -> AppResult<SubscriptionInfo> {
        self.check()?;
        let subscription = SubscriptionInfo {
            id: self.generate_id("sub"),
            customer_id: input.customer_id.clone(),
            status: SubscriptionStatus::Active,
            price_id: Some(input.price_id.clone()),
            current_period_end: None,
        };
        self.created_subscriptions.lock().unwrap().push(input);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionInfo> {
        self.check()?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        self.check()?;
        if let Some(error) = self.cancel_error.lock().unwrap().take() {
            return Err(error);
        }
        self.canceled_subscriptions
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }
}
