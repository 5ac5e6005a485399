//! Durable key-value storage for breaker projections.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker mutation
//!     → serde_json::to_value(PersistedCircuitState)
//!     → DurableStore::set("circuit_breaker:<serviceId>", value)
//!     → memory.rs (DashMap, tests/simulation)
//!       file.rs   (JSON document, temp file + rename)
//!
//! Process start:
//!     DurableStore::get(key) → rehydrate()
//! ```
//!
//! # Design Decisions
//! - One key per service, whole-object overwrite (no partial patches)
//! - Values are opaque JSON so the store knows nothing about breakers
//! - Writes may fail; callers decide how to surface that

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Crash-safe asynchronous key-value store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrite the value stored under `key`. Resolves once the write is durable.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
