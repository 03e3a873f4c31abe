//! Applies verified Stripe events to the subscription and credit records.
//!
//! Every handler is idempotent: all stamps use the event's `created` time, so
//! a redelivered event writes the same values a second time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_provider::{BillingProviderPort, SubscriptionInfo},
            key_value_store::KeyValueStore,
        },
        use_cases::{
            credit_ledger::{CreditLedger, period_elapsed},
            customer_index::CustomerIndex,
            plan_credits::PlanCreditTable,
            subscription_records::SubscriptionRecordManager,
        },
    },
    domain::entities::{
        billing_event::{
            BillingEvent, EventPayload, InvoiceObject, PaymentIntentObject, SetupIntentObject,
            SubscriptionObject,
        },
        subscription_record::{self as fields, SubscriptionUpdate},
        subscription_status::SubscriptionStatus,
        timestamp::from_unix,
    },
};

const SUBSCRIPTION_CYCLE: &str = "subscription_cycle";
const SUBSCRIPTION_CREATE: &str = "subscription_create";

/// What happened to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Records were written.
    Applied,
    /// Acknowledged without writing (log-only type, unmapped customer, not a trial flow).
    Ignored,
    /// The event id was already handled.
    Duplicate,
}

pub struct EventReconciler {
    billing: Arc<dyn BillingProviderPort>,
    customers: Arc<CustomerIndex>,
    subscriptions: Arc<SubscriptionRecordManager>,
    ledger: Arc<CreditLedger>,
    plans: Arc<PlanCreditTable>,
    store: Arc<dyn KeyValueStore>,
    processed_event_ttl_secs: u64,
}

impl EventReconciler {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        customers: Arc<CustomerIndex>,
        subscriptions: Arc<SubscriptionRecordManager>,
        ledger: Arc<CreditLedger>,
        plans: Arc<PlanCreditTable>,
        store: Arc<dyn KeyValueStore>,
        processed_event_ttl_secs: u64,
    ) -> Self {
        Self {
            billing,
            customers,
            subscriptions,
            ledger,
            plans,
            store,
            processed_event_ttl_secs,
        }
    }

    fn processed_key(event_id: &str) -> String {
        format!("stripe:event:{event_id}")
    }

    /// Handle one verified event.
    ///
    /// The event id is recorded only after the handler succeeds, so a failed
    /// event is processed again when Stripe retries it.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn reconcile(&self, event: &BillingEvent) -> AppResult<EventOutcome> {
        let key = Self::processed_key(&event.id);
        if !event.id.is_empty() && self.store.get(&key).await?.is_some() {
            info!("Event already processed, skipping");
            return Ok(EventOutcome::Duplicate);
        }

        let outcome = self.dispatch(event).await?;

        if !event.id.is_empty() {
            self.store
                .set(&key, &event.event_type, Some(self.processed_event_ttl_secs))
                .await?;
        }
        Ok(outcome)
    }

    async fn dispatch(&self, event: &BillingEvent) -> AppResult<EventOutcome> {
        let at = event.created;
        match &event.payload {
            EventPayload::CheckoutCompleted(session) => {
                info!(
                    session_id = %session.id,
                    customer = ?session.customer,
                    subscription = ?session.subscription,
                    "Checkout session completed"
                );
                Ok(EventOutcome::Ignored)
            }
            EventPayload::SubscriptionUpdated {
                subscription,
                previous_status,
            } => {
                self.subscription_updated(subscription, previous_status.as_deref(), at)
                    .await
            }
            EventPayload::SubscriptionDeleted(subscription) => {
                self.subscription_deleted(subscription, at).await
            }
            EventPayload::TrialWillEnd(subscription) => self.trial_will_end(subscription).await,
            EventPayload::InvoicePaymentSucceeded(invoice) => {
                self.invoice_payment_succeeded(invoice, at).await
            }
            EventPayload::InvoicePaymentFailed(invoice) => {
                self.invoice_payment_failed(invoice, at).await
            }
            EventPayload::PaymentIntentFailed(intent) => {
                self.trial_authorization_failed(intent, at).await
            }
            EventPayload::PaymentIntentCanceled(intent) => {
                self.trial_authorization_canceled(intent, at).await
            }
            EventPayload::PaymentIntentRequiresAction(intent) => {
                info!(payment_intent = %intent.id, "Payment requires customer action");
                Ok(EventOutcome::Ignored)
            }
            EventPayload::SetupIntentFailed(intent) => self.trial_setup_failed(intent, at).await,
            EventPayload::Unrecognized => {
                tracing::debug!("Unhandled webhook event type");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn resolve_user(&self, customer_id: Option<&str>) -> AppResult<Option<String>> {
        let Some(customer_id) = customer_id.filter(|c| !c.is_empty()) else {
            info!(retryable = false, "Event carries no customer id");
            return Ok(None);
        };
        let user_id = self.customers.resolve(customer_id).await?;
        if user_id.is_none() {
            info!(customer_id, retryable = false, "No user mapped to customer");
        }
        Ok(user_id)
    }

    // ========================================================================
    // Subscription events
    // ========================================================================

    async fn subscription_updated(
        &self,
        subscription: &SubscriptionObject,
        previous_status: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        let Some(user_id) = self.resolve_user(Some(&subscription.customer)).await? else {
            return Ok(EventOutcome::Ignored);
        };

        let status = SubscriptionStatus::from_stripe(&subscription.status);
        let previous = match previous_status {
            Some(prev) => Some(SubscriptionStatus::from_stripe(prev)),
            None => self
                .subscriptions
                .get(&user_id)
                .await?
                .and_then(|record| record.status),
        };
        let changed = previous != Some(status);

        let mut update = SubscriptionUpdate::new().status(status).last_updated(at);

        if previous == Some(SubscriptionStatus::Trialing) && status == SubscriptionStatus::Active {
            update = update
                .stamp(fields::TRIAL_ENDED_AT, at)
                .stamp(fields::TRIAL_TO_ACTIVE_DATE, at);
        }
        if changed && status == SubscriptionStatus::Canceled {
            update = update.stamp(fields::CANCELED_AT, at);
        }
        if changed && status.is_delinquent() {
            update = update.stamp(fields::UNPAID_AT, at);
        }
        if let Some(renewal) = subscription.period_end().and_then(from_unix) {
            update = update.stamp(fields::RENEWAL_DATE, renewal);
        }

        info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            previous = ?previous,
            status = %status,
            "Subscription status synced"
        );
        self.subscriptions.upsert(&user_id, update).await?;
        Ok(EventOutcome::Applied)
    }

    async fn subscription_deleted(
        &self,
        subscription: &SubscriptionObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        let Some(user_id) = self.resolve_user(Some(&subscription.customer)).await? else {
            return Ok(EventOutcome::Ignored);
        };

        self.ledger.zero(&user_id, at).await?;
        self.subscriptions.clear_on_cancel(&user_id, at).await?;

        info!(user_id = %user_id, subscription_id = %subscription.id, "Subscription deleted");
        Ok(EventOutcome::Applied)
    }

    async fn trial_will_end(&self, subscription: &SubscriptionObject) -> AppResult<EventOutcome> {
        if let Some(user_id) = self.resolve_user(Some(&subscription.customer)).await? {
            info!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                trial_end = ?subscription.trial_end.and_then(from_unix),
                "Trial will end soon"
            );
        }
        Ok(EventOutcome::Ignored)
    }

    // ========================================================================
    // Invoice events
    // ========================================================================

    async fn invoice_payment_succeeded(
        &self,
        invoice: &InvoiceObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        let Some(subscription_id) = invoice.subscription_id() else {
            info!(invoice_id = %invoice.id, "Invoice not tied to a subscription");
            return Ok(EventOutcome::Ignored);
        };

        let subscription = self.billing.get_subscription(subscription_id).await?;
        let Some(user_id) = self
            .resolve_user(Some(subscription.customer_id.as_str()))
            .await?
        else {
            return Ok(EventOutcome::Ignored);
        };

        let mut update = SubscriptionUpdate::new().last_updated(at);
        if let Some(renewal) = subscription.renews_at() {
            update = update.stamp(fields::RENEWAL_DATE, renewal);
        }

        match invoice.billing_reason() {
            SUBSCRIPTION_CYCLE => {
                let stored = self.subscriptions.get(&user_id).await?;
                update = update
                    .status(SubscriptionStatus::Active)
                    .stamp(fields::LAST_PAYMENT_DATE, at);
                if stored.and_then(|r| r.status) == Some(SubscriptionStatus::Trialing) {
                    update = update.stamp(fields::TRIAL_ENDED_AT, at);
                }

                let credits = self.ledger.get(&user_id).await?;
                if period_elapsed(credits.as_ref(), at.date_naive()) {
                    update = self
                        .renew_credits(&user_id, &subscription, update, at)
                        .await?;
                }
            }
            SUBSCRIPTION_CREATE => {
                update = update
                    .status(subscription.status)
                    .stamp(fields::INITIAL_PAYMENT_DATE, at);
            }
            _ => {
                update = update
                    .status(subscription.status)
                    .stamp(fields::LAST_PAYMENT_DATE, at);
            }
        }

        info!(
            user_id = %user_id,
            subscription_id,
            billing_reason = invoice.billing_reason(),
            "Invoice payment recorded"
        );
        self.subscriptions.upsert(&user_id, update).await?;
        Ok(EventOutcome::Applied)
    }

    /// Grant the plan's credits for a new period and refresh the plan fields.
    async fn renew_credits(
        &self,
        user_id: &str,
        subscription: &SubscriptionInfo,
        update: SubscriptionUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<SubscriptionUpdate> {
        let Some(price_id) = subscription.price_id.as_deref() else {
            warn!(user_id, subscription_id = %subscription.id, "Subscription has no price, credits not renewed");
            return Ok(update);
        };
        let price = self.billing.get_price(price_id).await?;
        let product = self.billing.get_product(&price.product_id).await?;
        let allowance = self.plans.allowance_for(&product.name);

        self.ledger
            .grant(user_id, allowance.credits, price.interval, at)
            .await?;

        Ok(update
            .plan(&product.name, allowance.plan_type)
            .interval(price.interval)
            .text(fields::PRICE_ID, price.id))
    }

    async fn invoice_payment_failed(
        &self,
        invoice: &InvoiceObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        if invoice.billing_reason() != SUBSCRIPTION_CYCLE {
            info!(
                invoice_id = %invoice.id,
                billing_reason = invoice.billing_reason(),
                "Payment failure outside a renewal, ignoring"
            );
            return Ok(EventOutcome::Ignored);
        }

        let customer_id = match (invoice.customer.as_deref(), invoice.subscription_id()) {
            (Some(customer), _) => Some(customer.to_string()),
            (None, Some(subscription_id)) => Some(
                self.billing
                    .get_subscription(subscription_id)
                    .await?
                    .customer_id
                    .0,
            ),
            (None, None) => None,
        };
        let Some(user_id) = self.resolve_user(customer_id.as_deref()).await? else {
            return Ok(EventOutcome::Ignored);
        };

        self.ledger.zero(&user_id, at).await?;
        self.subscriptions
            .upsert(
                &user_id,
                SubscriptionUpdate::new()
                    .status(SubscriptionStatus::PastDue)
                    .stamp(fields::PAYMENT_FAILED_AT, at)
                    .last_updated(at),
            )
            .await?;

        warn!(user_id = %user_id, invoice_id = %invoice.id, "Renewal payment failed, credits revoked");
        Ok(EventOutcome::Applied)
    }

    // ========================================================================
    // Trial authorization events
    // ========================================================================

    async fn trial_authorization_failed(
        &self,
        intent: &PaymentIntentObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        if !intent.is_trial_authorization() {
            return Ok(EventOutcome::Ignored);
        }
        let Some(user_id) = self.resolve_user(intent.customer.as_deref()).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let reason = intent
            .last_payment_error
            .as_ref()
            .map(|e| e.describe())
            .unwrap_or_else(|| "unknown".to_string());

        self.ledger.zero(&user_id, at).await?;
        self.subscriptions
            .upsert(
                &user_id,
                SubscriptionUpdate::new()
                    .status(SubscriptionStatus::PaymentFailed)
                    .stamp(fields::PAYMENT_FAILED_AT, at)
                    .text(fields::FAILURE_REASON, reason.as_str())
                    .last_updated(at),
            )
            .await?;

        warn!(user_id = %user_id, payment_intent = %intent.id, reason = %reason, "Trial authorization failed");
        Ok(EventOutcome::Applied)
    }

    async fn trial_authorization_canceled(
        &self,
        intent: &PaymentIntentObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        if !intent.is_trial_authorization() {
            return Ok(EventOutcome::Ignored);
        }
        let Some(user_id) = self.resolve_user(intent.customer.as_deref()).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let reason = intent
            .cancellation_reason
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        self.ledger.zero(&user_id, at).await?;
        self.subscriptions
            .upsert(
                &user_id,
                SubscriptionUpdate::new()
                    .status(SubscriptionStatus::Canceled)
                    .stamp(fields::CANCELED_AT, at)
                    .text(fields::CANCELLATION_REASON, reason.as_str())
                    .last_updated(at),
            )
            .await?;

        info!(user_id = %user_id, payment_intent = %intent.id, reason = %reason, "Trial authorization canceled");
        Ok(EventOutcome::Applied)
    }

    async fn trial_setup_failed(
        &self,
        intent: &SetupIntentObject,
        at: DateTime<Utc>,
    ) -> AppResult<EventOutcome> {
        if !intent.is_trial_setup() {
            return Ok(EventOutcome::Ignored);
        }
        let Some(user_id) = self.resolve_user(intent.customer.as_deref()).await? else {
            return Ok(EventOutcome::Ignored);
        };

        if let Some(subscription_id) = intent.subscription_id() {
            match self.billing.cancel_subscription(subscription_id).await {
                Ok(()) => {
                    info!(user_id = %user_id, subscription_id, "Canceled subscription after failed trial setup");
                }
                Err(error @ (AppError::NotFound | AppError::InvalidInput(_))) => {
                    info!(user_id = %user_id, subscription_id, error = %error, "Trial subscription already canceled");
                }
                Err(error) => return Err(error),
            }
        }

        let reason = intent
            .last_setup_error
            .as_ref()
            .map(|e| e.describe())
            .unwrap_or_else(|| "unknown".to_string());

        self.ledger.zero(&user_id, at).await?;
        self.subscriptions
            .upsert(
                &user_id,
                SubscriptionUpdate::new()
                    .status(SubscriptionStatus::SetupFailed)
                    .stamp(fields::SETUP_FAILED_AT, at)
                    .text(fields::FAILURE_REASON, reason.as_str())
                    .last_updated(at),
            )
            .await?;

        warn!(user_id = %user_id, setup_intent = %intent.id, reason = %reason, "Trial setup failed");
        Ok(EventOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::billing_provider::CustomerId;
    use crate::domain::entities::{
        plan_type::PlanType, subscription_record::SubscriptionRecord, timestamp::format_timestamp,
    };
    use crate::test_utils::{
        FakeBillingProvider, InMemoryStore, create_test_price, create_test_product,
        create_test_subscription_info, event_body, invoice_object, subscription_object,
    };
    use serde_json::json;

    const CREATED: i64 = 1_746_093_600; // 2025-05-01T10:00:00Z
    const CREATED_ISO: &str = "2025-05-01T10:00:00.000Z";

    struct Harness {
        store: Arc<InMemoryStore>,
        billing: Arc<FakeBillingProvider>,
        reconciler: EventReconciler,
    }

    fn harness() -> Harness {
        harness_with(FakeBillingProvider::new())
    }

    fn harness_with(billing: FakeBillingProvider) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let billing = Arc::new(billing);
        let kv: Arc<dyn KeyValueStore> = store.clone();
        let reconciler = EventReconciler::new(
            billing.clone(),
            Arc::new(CustomerIndex::new(kv.clone())),
            Arc::new(SubscriptionRecordManager::new(kv.clone())),
            Arc::new(CreditLedger::new(kv.clone())),
            Arc::new(PlanCreditTable::default()),
            kv,
            259_200,
        );
        store.put_string("stripe:customer:cus_1", "user_42");
        Harness {
            store,
            billing,
            reconciler,
        }
    }

    fn event(id: &str, event_type: &str, object: serde_json::Value) -> BillingEvent {
        BillingEvent::from_slice(&event_body(id, event_type, CREATED, object, None)).unwrap()
    }

    fn subscription(store: &InMemoryStore) -> SubscriptionRecord {
        SubscriptionRecord::from_fields(&store.hash("user:user_42:subscription")).unwrap()
    }

    // =========================================================================
    // customer.subscription.deleted
    // =========================================================================

    #[tokio::test]
    async fn deleted_subscription_zeroes_credits_and_cancels() {
        let h = harness();
        h.store.put_hash(
            "user:user_42:credits",
            &[("total", "500"), ("used", "37"), ("resetDate", "2025-06-01")],
        );
        h.store.put_hash(
            "user:user_42:subscription",
            &[("planType", "STANDARD"), ("status", "active"), ("amount", "15")],
        );

        let outcome = h
            .reconciler
            .reconcile(&event(
                "evt_del",
                "customer.subscription.deleted",
                subscription_object("sub_1", "cus_1", "canceled"),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Applied);
        let credits = h.store.hash("user:user_42:credits");
        assert_eq!(credits["total"], "0");
        assert_eq!(credits["used"], "0");
        assert_eq!(credits["resetDate"], "");
        assert_eq!(credits["lastUpdate"], CREATED_ISO);

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "canceled");
        assert_eq!(stored["planType"], "NONE");
        assert_eq!(stored["amount"], "0");
        assert_eq!(stored["stripeCustomerId"], "");
        assert_eq!(stored["stripeSubscriptionId"], "");
    }

    #[tokio::test]
    async fn deleted_subscription_without_prior_records() {
        let h = harness();

        h.reconciler
            .reconcile(&event(
                "evt_del",
                "customer.subscription.deleted",
                subscription_object("sub_1", "cus_1", "canceled"),
            ))
            .await
            .unwrap();

        let record = subscription(&h.store);
        assert_eq!(record.plan_type, PlanType::None);
        assert_eq!(record.status, Some(SubscriptionStatus::Canceled));
        assert_eq!(h.store.hash("user:user_42:credits")["total"], "0");
    }

    #[tokio::test]
    async fn unmapped_customer_is_acknowledged_without_writes() {
        let h = harness();
        let writes = h.store.write_count();

        let outcome = h
            .reconciler
            .reconcile(&event(
                "evt_x",
                "customer.subscription.deleted",
                subscription_object("sub_9", "cus_unknown", "canceled"),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Ignored);
        // Only the processed-event marker is written.
        assert_eq!(h.store.write_count(), writes + 1);
        assert!(h.store.hash("user:user_42:subscription").is_empty());
    }

    // =========================================================================
    // customer.subscription.updated
    // =========================================================================

    #[tokio::test]
    async fn trial_to_active_stamps_trial_end() {
        let h = harness();
        let mut object = subscription_object("sub_1", "cus_1", "active");
        object["current_period_end"] = json!(CREATED + 30 * 86_400);
        let body = event_body(
            "evt_up",
            "customer.subscription.updated",
            CREATED,
            object,
            Some(json!({"status": "trialing"})),
        );

        h.reconciler
            .reconcile(&BillingEvent::from_slice(&body).unwrap())
            .await
            .unwrap();

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "active");
        assert_eq!(stored["lastUpdated"], CREATED_ISO);
        assert_eq!(stored["trialEndedAt"], CREATED_ISO);
        assert_eq!(stored["trialToActiveDate"], CREATED_ISO);
        assert_eq!(stored["renewalDate"], "2025-05-31T10:00:00.000Z");
        assert!(!stored.contains_key("canceledAt"));
    }

    #[tokio::test]
    async fn update_falls_back_to_stored_status() {
        let h = harness();
        h.store
            .put_hash("user:user_42:subscription", &[("status", "active")]);

        h.reconciler
            .reconcile(&event(
                "evt_up",
                "customer.subscription.updated",
                subscription_object("sub_1", "cus_1", "past_due"),
            ))
            .await
            .unwrap();

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "past_due");
        assert_eq!(stored["unpaidAt"], CREATED_ISO);
    }

    #[tokio::test]
    async fn update_to_canceled_stamps_canceled_at() {
        let h = harness();
        h.store
            .put_hash("user:user_42:subscription", &[("status", "active")]);

        h.reconciler
            .reconcile(&event(
                "evt_up",
                "customer.subscription.updated",
                subscription_object("sub_1", "cus_1", "canceled"),
            ))
            .await
            .unwrap();

        assert_eq!(
            subscription(&h.store).canceled_at.map(format_timestamp).as_deref(),
            Some(CREATED_ISO)
        );
    }

    #[tokio::test]
    async fn update_is_idempotent() {
        let h = harness();
        h.store
            .put_hash("user:user_42:subscription", &[("status", "trialing")]);
        let body = event_body(
            "evt_up",
            "customer.subscription.updated",
            CREATED,
            subscription_object("sub_1", "cus_1", "active"),
            Some(json!({"status": "trialing"})),
        );
        let parsed = BillingEvent::from_slice(&body).unwrap();

        h.reconciler.reconcile(&parsed).await.unwrap();
        let first = h.store.hash("user:user_42:subscription");

        // Bypass duplicate suppression to re-run the handler itself.
        h.store.remove_key("stripe:event:evt_up");
        h.reconciler.reconcile(&parsed).await.unwrap();
        let second = h.store.hash("user:user_42:subscription");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn redelivered_event_is_skipped() {
        let h = harness();
        let parsed = event(
            "evt_dup",
            "customer.subscription.updated",
            subscription_object("sub_1", "cus_1", "active"),
        );

        assert_eq!(
            h.reconciler.reconcile(&parsed).await.unwrap(),
            EventOutcome::Applied
        );
        let writes = h.store.write_count();

        assert_eq!(
            h.reconciler.reconcile(&parsed).await.unwrap(),
            EventOutcome::Duplicate
        );
        assert_eq!(h.store.write_count(), writes);
        assert_eq!(h.store.ttl_of("stripe:event:evt_dup"), Some(259_200));
    }

    // =========================================================================
    // invoice.payment_succeeded / invoice.payment_failed
    // =========================================================================

    fn billing_with_standard_plan() -> FakeBillingProvider {
        FakeBillingProvider::new()
            .with_subscription(create_test_subscription_info(|s| {
                s.id = "sub_1".to_string();
                s.customer_id = CustomerId::new("cus_1");
                s.status = SubscriptionStatus::Active;
                s.price_id = Some("price_std".to_string());
            }))
            .with_price(create_test_price(|p| {
                p.id = "price_std".to_string();
                p.product_id = "prod_std".to_string();
            }))
            .with_product(create_test_product(|p| {
                p.id = "prod_std".to_string();
                p.name = "Standard Plan".to_string();
            }))
    }

    #[tokio::test]
    async fn renewal_regrants_elapsed_credits() {
        let h = harness_with(billing_with_standard_plan());
        h.store.put_hash(
            "user:user_42:credits",
            &[("total", "500"), ("used", "499"), ("resetDate", "2025-05-01")],
        );
        h.store
            .put_hash("user:user_42:subscription", &[("status", "trialing")]);

        h.reconciler
            .reconcile(&event(
                "evt_inv",
                "invoice.payment_succeeded",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_cycle"),
            ))
            .await
            .unwrap();

        let credits = h.store.hash("user:user_42:credits");
        assert_eq!(credits["total"], "500");
        assert_eq!(credits["used"], "0");
        assert_eq!(credits["resetDate"], "2025-06-01");

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "active");
        assert_eq!(stored["lastPaymentDate"], CREATED_ISO);
        assert_eq!(stored["trialEndedAt"], CREATED_ISO);
        assert_eq!(stored["planType"], "STANDARD");
    }

    #[tokio::test]
    async fn renewal_keeps_credits_inside_period() {
        let h = harness_with(billing_with_standard_plan());
        h.store.put_hash(
            "user:user_42:credits",
            &[("total", "500"), ("used", "120"), ("resetDate", "2025-06-01")],
        );

        h.reconciler
            .reconcile(&event(
                "evt_inv",
                "invoice.payment_succeeded",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_cycle"),
            ))
            .await
            .unwrap();

        assert_eq!(h.store.hash("user:user_42:credits")["used"], "120");
        assert!(
            !h.store
                .hash("user:user_42:subscription")
                .contains_key("trialEndedAt")
        );
    }

    #[tokio::test]
    async fn first_invoice_stamps_initial_payment() {
        let h = harness_with(billing_with_standard_plan());

        h.reconciler
            .reconcile(&event(
                "evt_inv",
                "invoice.payment_succeeded",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_create"),
            ))
            .await
            .unwrap();

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "active");
        assert_eq!(stored["initialPaymentDate"], CREATED_ISO);
        assert!(!stored.contains_key("lastPaymentDate"));
    }

    #[tokio::test]
    async fn billing_outage_is_retryable_and_not_marked_processed() {
        let h = harness_with(billing_with_standard_plan());
        h.billing.set_unavailable(true);

        let result = h
            .reconciler
            .reconcile(&event(
                "evt_inv",
                "invoice.payment_succeeded",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_cycle"),
            ))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
        assert!(err.is_retryable());
        assert_eq!(h.store.get_string("stripe:event:evt_inv"), None);
    }

    #[tokio::test]
    async fn failed_renewal_revokes_credits() {
        let h = harness();
        h.store
            .put_hash("user:user_42:credits", &[("total", "2000"), ("used", "5")]);

        h.reconciler
            .reconcile(&event(
                "evt_fail",
                "invoice.payment_failed",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_cycle"),
            ))
            .await
            .unwrap();

        assert_eq!(h.store.hash("user:user_42:credits")["total"], "0");
        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "past_due");
        assert_eq!(stored["paymentFailedAt"], CREATED_ISO);
    }

    #[tokio::test]
    async fn failed_first_invoice_is_ignored() {
        let h = harness();

        let outcome = h
            .reconciler
            .reconcile(&event(
                "evt_fail",
                "invoice.payment_failed",
                invoice_object("in_1", "cus_1", "sub_1", "subscription_create"),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(h.store.hash("user:user_42:credits").is_empty());
    }

    // =========================================================================
    // Trial authorization / setup
    // =========================================================================

    #[tokio::test]
    async fn trial_authorization_failure_records_reason() {
        let h = harness();

        h.reconciler
            .reconcile(&event(
                "evt_pi",
                "payment_intent.payment_failed",
                json!({
                    "id": "pi_1",
                    "customer": "cus_1",
                    "metadata": {"is_trial_authorization": "true"},
                    "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
                }),
            ))
            .await
            .unwrap();

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "payment_failed");
        assert_eq!(stored["failureReason"], "Your card was declined.");
        assert_eq!(stored["paymentFailedAt"], CREATED_ISO);
        assert_eq!(h.store.hash("user:user_42:credits")["total"], "0");
    }

    #[tokio::test]
    async fn ordinary_payment_intent_failure_is_ignored() {
        let h = harness();

        let outcome = h
            .reconciler
            .reconcile(&event(
                "evt_pi",
                "payment_intent.payment_failed",
                json!({"id": "pi_1", "customer": "cus_1", "metadata": {}}),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(h.store.hash("user:user_42:subscription").is_empty());
    }

    #[tokio::test]
    async fn trial_authorization_cancel_records_reason() {
        let h = harness();

        h.reconciler
            .reconcile(&event(
                "evt_pi",
                "payment_intent.canceled",
                json!({
                    "id": "pi_1",
                    "customer": "cus_1",
                    "metadata": {"is_trial_authorization": "true"},
                    "cancellation_reason": "abandoned"
                }),
            ))
            .await
            .unwrap();

        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "canceled");
        assert_eq!(stored["cancellationReason"], "abandoned");
        assert_eq!(stored["canceledAt"], CREATED_ISO);
    }

    #[tokio::test]
    async fn trial_setup_failure_cancels_subscription() {
        let h = harness();

        h.reconciler
            .reconcile(&trial_setup_failed_event())
            .await
            .unwrap();

        assert_eq!(h.billing.canceled_subscriptions(), vec!["sub_trial".to_string()]);
        let stored = h.store.hash("user:user_42:subscription");
        assert_eq!(stored["status"], "setup_failed");
        assert_eq!(stored["failureReason"], "setup_intent_authentication_failure");
        assert_eq!(stored["setupFailedAt"], CREATED_ISO);
    }

    fn trial_setup_failed_event() -> BillingEvent {
        event(
            "evt_si",
            "setup_intent.setup_failed",
            json!({
                "id": "seti_1",
                "customer": "cus_1",
                "metadata": {"is_trial_setup": "true", "subscription_id": "sub_trial"},
                "last_setup_error": {"code": "setup_intent_authentication_failure"}
            }),
        )
    }

    #[tokio::test]
    async fn trial_setup_failure_with_already_canceled_subscription() {
        for error in [
            AppError::NotFound,
            AppError::InvalidInput("Stripe error: No such subscription".into()),
        ] {
            let h = harness_with(FakeBillingProvider::new().fail_cancel_with(error));
            h.store.put_hash("user:user_42:credits", &[("total", "500"), ("used", "40")]);

            h.reconciler
                .reconcile(&trial_setup_failed_event())
                .await
                .unwrap();

            assert!(h.billing.canceled_subscriptions().is_empty());
            assert_eq!(h.store.hash("user:user_42:credits")["total"], "0");
            let stored = h.store.hash("user:user_42:subscription");
            assert_eq!(stored["status"], "setup_failed");
            assert_eq!(stored["setupFailedAt"], CREATED_ISO);
        }
    }

    #[tokio::test]
    async fn trial_setup_failure_retries_when_cancel_is_unavailable() {
        let h = harness_with(
            FakeBillingProvider::new()
                .fail_cancel_with(AppError::Provider("Stripe API error: 503".into())),
        );

        let err = h
            .reconciler
            .reconcile(&trial_setup_failed_event())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(h.store.hash("user:user_42:subscription").is_empty());
    }

    // =========================================================================
    // Log-only and unknown types
    // =========================================================================

    #[tokio::test]
    async fn log_only_events_do_not_touch_records() {
        let h = harness();

        for (id, event_type, object) in [
            (
                "evt_a",
                "checkout.session.completed",
                json!({"id": "cs_1", "customer": "cus_1"}),
            ),
            (
                "evt_b",
                "customer.subscription.trial_will_end",
                subscription_object("sub_1", "cus_1", "trialing"),
            ),
            (
                "evt_c",
                "payment_intent.requires_action",
                json!({"id": "pi_1", "customer": "cus_1"}),
            ),
            ("evt_d", "charge.refunded", json!({"id": "ch_1"})),
        ] {
            let outcome = h
                .reconciler
                .reconcile(&event(id, event_type, object))
                .await
                .unwrap();
            assert_eq!(outcome, EventOutcome::Ignored);
        }

        assert!(h.store.hash("user:user_42:subscription").is_empty());
        assert!(h.store.hash("user:user_42:credits").is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_retryable() {
        let h = harness();
        h.store.set_failing(true);

        let err = h
            .reconciler
            .reconcile(&event(
                "evt_del",
                "customer.subscription.deleted",
                subscription_object("sub_1", "cus_1", "canceled"),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert!(err.is_retryable());
    }
}
