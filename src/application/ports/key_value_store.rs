use std::collections::HashMap;

use async_trait::async_trait;

use crate::app_error::AppResult;

/// Namespaced string-keyed persistence. Implemented by Redis in production
/// and by an in-memory map in tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// All fields of a hash. A missing key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>>;

    /// Merge fields into a hash, leaving unspecified fields untouched.
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a string value, optionally expiring after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;
}
