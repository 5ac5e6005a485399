//! In-process store.
//!
//! Survives the loss of a breaker instance (the map is shared through an
//! `Arc`), which is enough to simulate a host restart in tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::StoreError;
use crate::storage::DurableStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, Value>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage: while enabled every `set` fails.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write to {} rejected", key)));
        }
        self.inner.insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.iter().map(|r| r.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", json!({"n": 1})).await.unwrap();
        store.set("a", json!({"n": 2})).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!({"n": 2})));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_outage_rejects_writes_only() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();

        store.set_fail_writes(true);
        let err = store.set("a", json!(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));

        store.set_fail_writes(false);
        store.set("a", json!(3)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!(3)));
    }
}
