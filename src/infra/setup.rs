use crate::{
    adapters::{http::app_state::AppState, persistence::RedisStore},
    application::ports::{billing_provider::BillingProviderPort, key_value_store::KeyValueStore},
    infra::{config::AppConfig, error::InfraError, stripe_billing_adapter::StripeBillingAdapter},
    use_cases::{
        account::AccountUseCases, checkout::CheckoutUseCases, credit_ledger::CreditLedger,
        customer_index::CustomerIndex, event_reconciler::EventReconciler,
        plan_credits::PlanCreditTable, profiles::ProfileStore,
        subscription_records::SubscriptionRecordManager,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    let customers = Arc::new(CustomerIndex::new(store.clone()));
    let subscriptions = Arc::new(SubscriptionRecordManager::new(store.clone()));
    let ledger = Arc::new(CreditLedger::new(store.clone()));
    let profiles = Arc::new(ProfileStore::new(store.clone()));
    let plans = Arc::new(PlanCreditTable::default());

    let account_use_cases = Arc::new(AccountUseCases::new(
        profiles.clone(),
        subscriptions.clone(),
        ledger.clone(),
    ));

    let (checkout_use_cases, event_reconciler) = match config.stripe_secret_key.clone() {
        Some(secret_key) => {
            let billing: Arc<dyn BillingProviderPort> =
                Arc::new(StripeBillingAdapter::new(secret_key));
            let checkout = CheckoutUseCases::new(
                billing.clone(),
                customers.clone(),
                subscriptions.clone(),
                ledger.clone(),
                profiles,
                plans.clone(),
                config.app_origin.to_string(),
            );
            let reconciler = EventReconciler::new(
                billing,
                customers,
                subscriptions,
                ledger,
                plans,
                store,
                config.processed_event_ttl_secs,
            );
            (Some(Arc::new(checkout)), Some(Arc::new(reconciler)))
        }
        None => (None, None),
    };

    Ok(AppState {
        config: Arc::new(config),
        account_use_cases,
        checkout_use_cases,
        event_reconciler,
    })
}

pub fn init_tracing() -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "analyst_billing=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don't show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs)
    let file = File::create("app.log").map_err(InfraError::LogFile)?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}
