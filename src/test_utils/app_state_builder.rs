//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases over an `InMemoryStore` and
//! a `FakeBillingProvider`, so route tests exercise the full request path.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use time::Duration;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt,
        ports::key_value_store::KeyValueStore,
        use_cases::{
            account::AccountUseCases, checkout::CheckoutUseCases, credit_ledger::CreditLedger,
            customer_index::CustomerIndex, event_reconciler::EventReconciler,
            plan_credits::PlanCreditTable, profiles::ProfileStore,
            subscription_records::SubscriptionRecordManager,
        },
    },
    infra::config::AppConfig,
    test_utils::{FakeBillingProvider, InMemoryStore},
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestAppStateBuilder {
    store: Arc<InMemoryStore>,
    billing: Option<Arc<FakeBillingProvider>>,
    webhook_secret: Option<String>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            billing: Some(Arc::new(FakeBillingProvider::new())),
            webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        }
    }

    pub fn with_store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_billing(mut self, billing: Arc<FakeBillingProvider>) -> Self {
        self.billing = Some(billing);
        self
    }

    /// Build as if `STRIPE_SECRET_KEY` were unset.
    pub fn without_billing(mut self) -> Self {
        self.billing = None;
        self
    }

    /// Build as if `STRIPE_WEBHOOK_SECRET` were unset.
    pub fn without_webhook_secret(mut self) -> Self {
        self.webhook_secret = None;
        self
    }

    pub fn build(self) -> AppState {
        let kv: Arc<dyn KeyValueStore> = self.store;
        let customers = Arc::new(CustomerIndex::new(kv.clone()));
        let subscriptions = Arc::new(SubscriptionRecordManager::new(kv.clone()));
        let ledger = Arc::new(CreditLedger::new(kv.clone()));
        let profiles = Arc::new(ProfileStore::new(kv.clone()));
        let plans = Arc::new(PlanCreditTable::default());

        let config = Arc::new(AppConfig {
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            app_origin: Url::parse("https://app.example.com").unwrap(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            redis_url: String::new(),
            stripe_secret_key: self
                .billing
                .as_ref()
                .map(|_| SecretString::new("sk_test".into())),
            stripe_webhook_secret: self.webhook_secret.map(|s| SecretString::new(s.into())),
            webhook_tolerance_secs: 300,
            processed_event_ttl_secs: 259_200,
        });

        let account_use_cases = Arc::new(AccountUseCases::new(
            profiles.clone(),
            subscriptions.clone(),
            ledger.clone(),
        ));

        let (checkout_use_cases, event_reconciler) = match self.billing {
            Some(billing) => (
                Some(Arc::new(CheckoutUseCases::new(
                    billing.clone(),
                    customers.clone(),
                    subscriptions.clone(),
                    ledger.clone(),
                    profiles,
                    plans.clone(),
                    config.app_origin.to_string(),
                ))),
                Some(Arc::new(EventReconciler::new(
                    billing,
                    customers,
                    subscriptions,
                    ledger,
                    plans,
                    kv,
                    config.processed_event_ttl_secs,
                ))),
            ),
            None => (None, None),
        };

        AppState {
            config,
            account_use_cases,
            checkout_use_cases,
            event_reconciler,
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed session token accepted by the test config.
pub fn session_token(user_id: &str, email: Option<&str>) -> String {
    jwt::issue(
        user_id,
        email,
        &SecretString::new(TEST_JWT_SECRET.into()),
        Duration::hours(1),
    )
    .unwrap()
}
