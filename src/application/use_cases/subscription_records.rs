use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    app_error::AppResult,
    application::ports::key_value_store::KeyValueStore,
    domain::entities::{
        plan_type::PlanType,
        subscription_record::{
            self as fields, SubscriptionRecord, SubscriptionUpdate,
        },
        subscription_status::SubscriptionStatus,
    },
};

/// Per-user subscription hash stored at `user:{id}:subscription`.
pub struct SubscriptionRecordManager {
    store: Arc<dyn KeyValueStore>,
}

impl SubscriptionRecordManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(user_id: &str) -> String {
        format!("user:{user_id}:subscription")
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: &str) -> AppResult<Option<SubscriptionRecord>> {
        let stored = self.store.hash_get_all(&Self::key(user_id)).await?;
        Ok(SubscriptionRecord::from_fields(&stored))
    }

    /// Merge the given fields; fields not in `update` keep their stored value.
    #[instrument(skip(self, update))]
    pub async fn upsert(&self, user_id: &str, update: SubscriptionUpdate) -> AppResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        tracing::debug!(user_id, status = ?update.get(fields::STATUS), "Updating subscription record");
        self.store
            .hash_set(&Self::key(user_id), &update.into_fields())
            .await
    }

    /// Reset the record to its cancelled shape. History stamps are kept.
    #[instrument(skip(self))]
    pub async fn clear_on_cancel(&self, user_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let update = SubscriptionUpdate::new()
            .plan("", PlanType::None)
            .status(SubscriptionStatus::Canceled)
            .amount(0.0)
            .clear(fields::INTERVAL)
            .clear(fields::RENEWAL_DATE)
            .stripe_ids("", "")
            .stamp(fields::CANCELED_AT, at)
            .last_updated(at);
        self.upsert(user_id, update).await?;
        tracing::info!(user_id, "Subscription record cleared on cancellation");
        Ok(())
    }

    /// Drop the whole record. Used before writing a replacement subscription.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: &str) -> AppResult<()> {
        self.store.delete(&Self::key(user_id)).await
    }
}
