use std::collections::HashMap;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::key_value_store::KeyValueStore,
    infra::error::InfraError,
};

/// Redis-backed store shared by every record manager.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let mut conn = self.manager.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| AppError::Store(e.to_string()))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> AppResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| AppError::Store(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = match ttl_secs {
            Some(ttl) => conn.set_ex(key, value, ttl).await,
            None => conn.set(key, value).await,
        };
        result.map_err(|e| AppError::Store(e.to_string()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }
}
