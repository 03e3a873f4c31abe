//! In-memory implementation of the key-value store port.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::key_value_store::KeyValueStore,
};

// ============================================================================
// InMemoryStore
// ============================================================================

/// Hashes and strings kept in maps. Every write through the port is counted;
/// seeding helpers (`put_hash`, `put_string`) are not.
#[derive(Default)]
pub struct InMemoryStore {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    strings: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, u64>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let mut hashes = self.hashes.lock().unwrap();
        let entry = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.to_string());
        }
    }

    /// Fields of a hash, empty when the key is absent.
    pub fn hash(&self, key: &str) -> HashMap<String, String> {
        self.hashes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn put_string(&self, key: &str, value: &str) {
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.strings.lock().unwrap().get(key).cloned()
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    pub fn remove_key(&self, key: &str) {
        self.hashes.lock().unwrap().remove(key);
        self.strings.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every port call fail as if the server were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Store("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        self.check()?;
        Ok(self.hash(key))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> AppResult<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut hashes = self.hashes.lock().unwrap();
        let entry = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check()?;
        Ok(self.get_string(key))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> AppResult<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put_string(key, value);
        let mut ttls = self.ttls.lock().unwrap();
        match ttl_secs {
            Some(ttl) => ttls.insert(key.to_string(), ttl),
            None => ttls.remove(key),
        };
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.remove_key(key);
        Ok(())
    }
}
