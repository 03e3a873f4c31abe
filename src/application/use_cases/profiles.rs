use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_error::AppResult,
    application::ports::key_value_store::KeyValueStore,
    domain::entities::timestamp::format_timestamp,
};

const EMAIL: &str = "email";
const NAME: &str = "name";
const IMAGE: &str = "image";
const JOINED_DATE: &str = "joinedDate";
const ROLE: &str = "role";
const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub joined_date: Option<String>,
    pub role: String,
}

impl Profile {
    fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let text = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();
        Some(Self {
            email: text(EMAIL),
            name: text(NAME),
            image: text(IMAGE),
            joined_date: text(JOINED_DATE),
            role: text(ROLE).unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        })
    }
}

/// User profile hash stored at `user:{id}`.
pub struct ProfileStore {
    store: Arc<dyn KeyValueStore>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: &str) -> AppResult<Option<Profile>> {
        let fields = self.store.hash_get_all(&Self::key(user_id)).await?;
        Ok(Profile::from_fields(&fields))
    }

    /// Record the email and create the join date and role on first sight.
    #[instrument(skip(self))]
    pub async fn ensure(&self, user_id: &str, email: &str, at: DateTime<Utc>) -> AppResult<()> {
        let key = Self::key(user_id);
        let existing = self.store.hash_get_all(&key).await?;

        let mut update = Vec::new();
        if !email.is_empty() && existing.get(EMAIL).map(String::as_str) != Some(email) {
            update.push((EMAIL.to_string(), email.to_string()));
        }
        if existing.get(JOINED_DATE).is_none_or(|v| v.is_empty()) {
            update.push((JOINED_DATE.to_string(), format_timestamp(at)));
        }
        if existing.get(ROLE).is_none_or(|v| v.is_empty()) {
            update.push((ROLE.to_string(), DEFAULT_ROLE.to_string()));
        }

        if update.is_empty() {
            return Ok(());
        }
        self.store.hash_set(&key, &update).await
    }
}
