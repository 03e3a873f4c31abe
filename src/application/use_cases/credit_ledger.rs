use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::key_value_store::KeyValueStore,
    domain::entities::{billing_interval::BillingInterval, credit_record::CreditRecord},
};

/// Per-user credit balance stored at `user:{id}:credits`.
pub struct CreditLedger {
    store: Arc<dyn KeyValueStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(user_id: &str) -> String {
        format!("user:{user_id}:credits")
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: &str) -> AppResult<Option<CreditRecord>> {
        let fields = self.store.hash_get_all(&Self::key(user_id)).await?;
        Ok(CreditRecord::from_fields(&fields))
    }

    /// Start a new period: `total` credits, nothing used, reset at the next boundary.
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        user_id: &str,
        total: i64,
        interval: BillingInterval,
        at: DateTime<Utc>,
    ) -> AppResult<CreditRecord> {
        let record = CreditRecord {
            total,
            used: 0,
            reset_date: Some(interval.next_reset_date(at.date_naive())),
            last_update: Some(at),
        };
        self.write(user_id, &record).await?;
        tracing::info!(user_id, total, reset_date = ?record.reset_date, "Credits granted");
        Ok(record)
    }

    /// Revoke all credits and clear the reset date.
    #[instrument(skip(self))]
    pub async fn zero(&self, user_id: &str, at: DateTime<Utc>) -> AppResult<CreditRecord> {
        let record = CreditRecord::revoked(at);
        self.write(user_id, &record).await?;
        tracing::info!(user_id, "Credits revoked");
        Ok(record)
    }

    /// Charge `amount` credits. Fails without writing when the balance is short.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        user_id: &str,
        amount: i64,
        at: DateTime<Utc>,
    ) -> AppResult<CreditRecord> {
        if amount < 0 {
            return Err(AppError::InvalidInput("Credit amount must not be negative".into()));
        }
        let Some(mut record) = self.get(user_id).await? else {
            return Err(AppError::InsufficientCredits);
        };
        if record.used + amount > record.total {
            tracing::info!(
                user_id,
                amount,
                total = record.total,
                used = record.used,
                "Credit charge refused"
            );
            return Err(AppError::InsufficientCredits);
        }
        record.used += amount;
        record.last_update = Some(at);
        self.write(user_id, &record).await?;
        Ok(record)
    }

    async fn write(&self, user_id: &str, record: &CreditRecord) -> AppResult<()> {
        self.store
            .hash_set(&Self::key(user_id), &record.to_fields())
            .await
    }
}

/// Whether a renewal should start a fresh credit period: the stored period
/// has elapsed, there is no record, or credits were revoked.
pub fn period_elapsed(record: Option<&CreditRecord>, today: NaiveDate) -> bool {
    match record {
        None => true,
        Some(record) if record.total == 0 => true,
        Some(record) => record.reset_date.is_none_or(|reset| today >= reset),
    }
}
