use std::sync::Arc;

use tracing::{instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::key_value_store::KeyValueStore,
};

/// Maps billing-provider customer ids to user ids.
pub struct CustomerIndex {
    store: Arc<dyn KeyValueStore>,
}

impl CustomerIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(customer_id: &str) -> String {
        format!("stripe:customer:{customer_id}")
    }

    #[instrument(skip(self))]
    pub async fn link(&self, customer_id: &str, user_id: &str) -> AppResult<()> {
        self.store
            .set(&Self::key(customer_id), user_id, None)
            .await
    }

    /// Link a customer to the user unless it is already linked to someone else.
    #[instrument(skip(self))]
    pub async fn claim(&self, customer_id: &str, user_id: &str) -> AppResult<()> {
        if let Some(owner) = self.resolve(customer_id).await? {
            if owner != user_id {
                warn!(customer_id, owner = %owner, "Customer already linked to another user");
                return Err(AppError::Forbidden);
            }
            return Ok(());
        }
        self.link(customer_id, user_id).await
    }

    /// User id for a customer, or `None` when the customer is unknown.
    #[instrument(skip(self))]
    pub async fn resolve(&self, customer_id: &str) -> AppResult<Option<String>> {
        if customer_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .get(&Self::key(customer_id))
            .await?
            .filter(|user_id| !user_id.is_empty()))
    }
}
