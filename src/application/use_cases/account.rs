use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        credit_ledger::CreditLedger, profiles::Profile, profiles::ProfileStore,
        subscription_records::SubscriptionRecordManager,
    },
    domain::entities::{
        credit_record::CreditRecord, model_tier::ModelTier,
        subscription_record::SubscriptionRecord,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub profile: Option<Profile>,
    pub subscription: Option<SubscriptionRecord>,
    pub credits: Option<CreditRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditCharge {
    pub model: String,
    pub tier: ModelTier,
    pub cost: i64,
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
}

/// Read side of a user's billing state, plus per-request credit charges.
pub struct AccountUseCases {
    profiles: Arc<ProfileStore>,
    subscriptions: Arc<SubscriptionRecordManager>,
    ledger: Arc<CreditLedger>,
}

impl AccountUseCases {
    pub fn new(
        profiles: Arc<ProfileStore>,
        subscriptions: Arc<SubscriptionRecordManager>,
        ledger: Arc<CreditLedger>,
    ) -> Self {
        Self {
            profiles,
            subscriptions,
            ledger,
        }
    }

    #[instrument(skip(self))]
    pub async fn overview(&self, user_id: &str) -> AppResult<AccountOverview> {
        Ok(AccountOverview {
            profile: self.profiles.get(user_id).await?,
            subscription: self.subscriptions.get(user_id).await?,
            credits: self.ledger.get(user_id).await?,
        })
    }

    /// Charge the credit cost of one request to `model`.
    #[instrument(skip(self))]
    pub async fn charge_model(&self, user_id: &str, model: &str) -> AppResult<CreditCharge> {
        if model.trim().is_empty() {
            return Err(AppError::InvalidInput("Model is required".into()));
        }
        let tier = ModelTier::for_model(model);
        let cost = tier.credits();
        let record = self.ledger.consume(user_id, cost, Utc::now()).await?;

        Ok(CreditCharge {
            model: model.to_string(),
            tier,
            cost,
            total: record.total,
            used: record.used,
            remaining: record.remaining(),
        })
    }
}
