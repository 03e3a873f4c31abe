use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_provider::{
            BillingProviderPort, CheckoutSessionRequest, CheckoutSessionResult, CustomerId,
            NewSubscription, PriceInfo,
        },
        use_cases::{
            credit_ledger::CreditLedger,
            customer_index::CustomerIndex,
            plan_credits::PlanCreditTable,
            profiles::ProfileStore,
            promo_codes::{self, AppliedPromo, PromoCodeInfo, PromoRejection, to_major_units},
            subscription_records::SubscriptionRecordManager,
        },
    },
    domain::entities::{
        plan_type::PlanType,
        subscription_record::{self as fields, SubscriptionUpdate},
        subscription_status::SubscriptionStatus,
    },
};

// Setup intent metadata keys.
const META_USER_ID: &str = "user_id";
const META_PRICE_ID: &str = "price_id";
const META_PRODUCT_ID: &str = "product_id";
const META_PROMOTION_CODE: &str = "promotion_code";
const META_PROMOTION_CODE_ID: &str = "promotion_code_id";
const META_COUPON_ID: &str = "coupon_id";
const META_DISCOUNT_AMOUNT: &str = "discount_amount";

const SETUP_SUCCEEDED: &str = "succeeded";

/// Price quote returned with a new setup intent. Amounts in major units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupIntentQuote {
    pub client_secret: String,
    pub price_id: String,
    pub product_id: String,
    pub original_amount: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code_info: Option<PromoCodeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeInput {
    pub setup_intent_id: String,
    pub price_id: String,
    #[serde(default)]
    pub promo_code_info: Option<PromoCodeInfo>,
    #[serde(default)]
    pub promotion_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedSubscription {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub plan: String,
    pub plan_type: PlanType,
    pub credits: i64,
}

pub struct CheckoutUseCases {
    billing: Arc<dyn BillingProviderPort>,
    customers: Arc<CustomerIndex>,
    subscriptions: Arc<SubscriptionRecordManager>,
    ledger: Arc<CreditLedger>,
    profiles: Arc<ProfileStore>,
    plans: Arc<PlanCreditTable>,
    app_origin: String,
}

impl CheckoutUseCases {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        customers: Arc<CustomerIndex>,
        subscriptions: Arc<SubscriptionRecordManager>,
        ledger: Arc<CreditLedger>,
        profiles: Arc<ProfileStore>,
        plans: Arc<PlanCreditTable>,
        app_origin: String,
    ) -> Self {
        Self {
            billing,
            customers,
            subscriptions,
            ledger,
            profiles,
            plans,
            app_origin: app_origin.trim_end_matches('/').to_string(),
        }
    }

    /// Reuse or create the billing customer and index it to the user.
    /// A customer owned by another user is refused.
    async fn customer_for(&self, user_id: &str, email: &str) -> AppResult<CustomerId> {
        if email.trim().is_empty() {
            return Err(AppError::InvalidInput("Email is required".into()));
        }
        let customer = self.billing.find_or_create_customer(email, user_id).await?;
        if let Some(owner) = customer.user_id.as_deref().filter(|owner| *owner != user_id) {
            warn!(customer_id = %customer.id, owner, "Billing customer belongs to another user");
            return Err(AppError::Forbidden);
        }
        self.customers.claim(customer.id.as_str(), user_id).await?;
        self.profiles.ensure(user_id, email, Utc::now()).await?;
        Ok(customer.id)
    }

    // ========================================================================
    // Embedded checkout
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        email: &str,
        price_id: &str,
    ) -> AppResult<CheckoutSessionResult> {
        if price_id.trim().is_empty() {
            return Err(AppError::InvalidInput("Price is required".into()));
        }
        let customer_id = self.customer_for(user_id, email).await?;

        let session = self
            .billing
            .create_checkout_session(CheckoutSessionRequest {
                customer_id,
                price_id: price_id.to_string(),
                user_id: user_id.to_string(),
                return_url: format!(
                    "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.app_origin
                ),
            })
            .await?;

        info!(user_id, session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    // ========================================================================
    // Deferred checkout: setup intent, then finalize
    // ========================================================================

    /// Check a promotion code against a price, naming the allowed products
    /// when the code is limited to other products.
    #[instrument(skip(self, price), fields(price_id = %price.id))]
    pub async fn validate_promotion_code(
        &self,
        code: &str,
        price: &PriceInfo,
    ) -> AppResult<AppliedPromo> {
        let promo = self.billing.find_promotion_code(code).await?;
        match promo_codes::evaluate(promo.as_ref(), price, Utc::now()) {
            Ok(applied) => Ok(applied),
            Err(PromoRejection::WrongProduct(product_ids)) => {
                let mut names = Vec::with_capacity(product_ids.len());
                for product_id in &product_ids {
                    names.push(self.billing.get_product(product_id).await?.name);
                }
                info!(code, allowed = ?names, "Promotion code limited to other products");
                Err(AppError::InvalidInput(format!(
                    "This promotion code is only valid for {}",
                    names.join(" or ")
                )))
            }
            Err(rejection) => {
                info!(code, reason = %rejection, "Promotion code rejected");
                Err(rejection.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn create_setup_intent(
        &self,
        user_id: &str,
        email: &str,
        price_id: &str,
        promotion_code: Option<&str>,
    ) -> AppResult<SetupIntentQuote> {
        if price_id.trim().is_empty() {
            return Err(AppError::InvalidInput("Price is required".into()));
        }
        let price = self.billing.get_price(price_id).await?;

        let promo = match promotion_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.validate_promotion_code(code, &price).await?),
            None => None,
        };

        let customer_id = self.customer_for(user_id, email).await?;

        let mut metadata = HashMap::from([
            (META_USER_ID.to_string(), user_id.to_string()),
            (META_PRICE_ID.to_string(), price.id.clone()),
            (META_PRODUCT_ID.to_string(), price.product_id.clone()),
        ]);
        if let Some(promo) = &promo {
            metadata.insert(META_PROMOTION_CODE.to_string(), promo.code.clone());
            metadata.insert(
                META_PROMOTION_CODE_ID.to_string(),
                promo.promotion_code_id.clone(),
            );
            metadata.insert(META_COUPON_ID.to_string(), promo.coupon_id.clone());
            metadata.insert(
                META_DISCOUNT_AMOUNT.to_string(),
                promo.discount_amount.to_string(),
            );
        }

        let intent = self
            .billing
            .create_setup_intent(&customer_id, metadata)
            .await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::Provider("Setup intent has no client secret".into()))?;

        let discount = promo.as_ref().map(|p| p.discount_amount).unwrap_or(0);
        info!(
            user_id,
            setup_intent = %intent.id,
            price_id = %price.id,
            discount,
            "Setup intent created"
        );

        Ok(SetupIntentQuote {
            client_secret,
            price_id: price.id,
            product_id: price.product_id,
            original_amount: to_major_units(price.unit_amount),
            discount_amount: to_major_units(discount),
            final_amount: to_major_units(price.unit_amount - discount),
            promotion_code: promo.as_ref().map(|p| p.code.clone()),
            promo_code_info: promo.as_ref().map(AppliedPromo::info),
        })
    }

    /// Create the subscription for a confirmed setup intent and write the
    /// subscription record and credit grant.
    ///
    /// The discount comes from the setup intent metadata written when the
    /// code was validated; promotion details sent by the client are only
    /// compared against it.
    #[instrument(skip(self, input), fields(setup_intent = %input.setup_intent_id))]
    pub async fn finalize_subscription(
        &self,
        user_id: &str,
        input: FinalizeInput,
    ) -> AppResult<FinalizedSubscription> {
        let intent = self.billing.get_setup_intent(&input.setup_intent_id).await?;

        if intent.status != SETUP_SUCCEEDED {
            return Err(AppError::InvalidInput(format!(
                "Payment method setup has not completed (status: {})",
                intent.status
            )));
        }
        let Some(payment_method_id) = intent.payment_method_id.clone() else {
            return Err(AppError::InvalidInput(
                "Setup intent has no payment method attached".into(),
            ));
        };
        if intent.metadata_value(META_USER_ID) != Some(user_id) {
            warn!(user_id, "Setup intent belongs to a different user");
            return Err(AppError::Forbidden);
        }
        let Some(customer_id) = intent.customer_id.clone() else {
            return Err(AppError::InvalidInput("Setup intent has no customer".into()));
        };
        self.customers.claim(&customer_id, user_id).await?;
        if let Some(intent_price) = intent.metadata_value(META_PRICE_ID) {
            if intent_price != input.price_id {
                return Err(AppError::InvalidInput(
                    "Price does not match the payment setup".into(),
                ));
            }
        }

        let promotion_code = intent.metadata_value(META_PROMOTION_CODE).map(str::to_string);
        let promotion_code_id = intent
            .metadata_value(META_PROMOTION_CODE_ID)
            .map(str::to_string);
        let coupon_id = intent.metadata_value(META_COUPON_ID).map(str::to_string);
        let discount: i64 = intent
            .metadata_value(META_DISCOUNT_AMOUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let client_code = input
            .promotion_code
            .as_deref()
            .or(input.promo_code_info.as_ref().map(|info| info.code.as_str()))
            .filter(|c| !c.is_empty());
        if client_code.is_some() && client_code != promotion_code.as_deref() {
            warn!(
                user_id,
                client_code = ?client_code,
                recorded_code = ?promotion_code,
                "Client promotion code differs from setup intent, using setup intent"
            );
        }

        let price = self.billing.get_price(&input.price_id).await?;
        let product = self.billing.get_product(&price.product_id).await?;
        let allowance = self.plans.allowance_for(&product.name);

        let subscription = self
            .billing
            .create_subscription(NewSubscription {
                customer_id: CustomerId::new(customer_id.clone()),
                price_id: price.id.clone(),
                payment_method_id,
                // Stripe accepts one discount; the promotion code implies its coupon.
                coupon_id: if promotion_code_id.is_some() {
                    None
                } else {
                    coupon_id
                },
                promotion_code_id,
                metadata: HashMap::from([(META_USER_ID.to_string(), user_id.to_string())]),
            })
            .await?;

        let now = Utc::now();
        self.subscriptions.remove(user_id).await?;

        let mut update = SubscriptionUpdate::new()
            .plan(&product.name, allowance.plan_type)
            .status(subscription.status)
            .amount(to_major_units((price.unit_amount - discount).max(0)))
            .interval(price.interval)
            .text(fields::PRICE_ID, price.id.clone())
            .stamp(fields::PURCHASE_DATE, now)
            .last_updated(now)
            .stripe_ids(&customer_id, &subscription.id);
        if let Some(renewal) = subscription.renews_at() {
            update = update.stamp(fields::RENEWAL_DATE, renewal);
        }
        if let Some(code) = &promotion_code {
            update = update.text(fields::PROMOTION_CODE, code.clone());
        }
        self.subscriptions.upsert(user_id, update).await?;
        self.ledger
            .grant(user_id, allowance.credits, price.interval, now)
            .await?;

        info!(
            user_id,
            subscription_id = %subscription.id,
            plan = %product.name,
            plan_type = %allowance.plan_type,
            credits = allowance.credits,
            "Subscription finalized"
        );

        Ok(FinalizedSubscription {
            subscription_id: subscription.id,
            status: subscription.status,
            plan: product.name,
            plan_type: allowance.plan_type,
            credits: allowance.credits,
        })
    }
}
