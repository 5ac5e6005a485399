//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call site (STT / LLM adapter):
//!     → BreakerRegistry::get(service_id)
//!     → CircuitBreaker::allow_request()  (false: skip the network call)
//!     → perform request
//!     → record_success() / record_failure()
//!         → state.rs projection mutated
//!         → persisted to DurableStore
//!         → recovery alarm armed / cleared in DurableTimers
//!         → state-change listener notified
//!
//! Recovery alarm fires (possibly in a new process):
//!     → registry.rs resolves service_id from the alarm name
//!     → CircuitBreaker::on_recovery_alarm() → Half-Open
//! ```
//!
//! # Design Decisions
//! - One breaker per service, owned by the registry
//! - Durable state is the source of truth across restarts
//! - Rehydration can reach Half-Open without any alarm

pub mod circuit_breaker;
pub mod registry;
pub mod state;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, StateChangeListener};
pub use registry::BreakerRegistry;
pub use state::{CircuitState, PersistedCircuitState};

use crate::error::StoreError;
use crate::storage::DurableStore;

/// Store key prefix for breaker projections.
pub const STATE_KEY_PREFIX: &str = "circuit_breaker:";

/// Durable timer name prefix for recovery alarms.
pub const ALARM_PREFIX: &str = "circuit_breaker_recovery:";

/// Store key holding the projection of `service_id`.
pub fn state_key(service_id: &str) -> String {
    format!("{}{}", STATE_KEY_PREFIX, service_id)
}

/// Name of the recovery alarm of `service_id`.
pub fn alarm_name(service_id: &str) -> String {
    format!("{}{}", ALARM_PREFIX, service_id)
}

/// Service a recovery alarm belongs to, or `None` for foreign alarms.
pub fn service_id_from_alarm(name: &str) -> Option<&str> {
    name.strip_prefix(ALARM_PREFIX).filter(|id| !id.is_empty())
}

/// Service a store key belongs to, or `None` for keys of other subsystems.
pub fn service_id_from_state_key(key: &str) -> Option<&str> {
    key.strip_prefix(STATE_KEY_PREFIX).filter(|id| !id.is_empty())
}

/// Every service with a persisted projection, sorted.
///
/// Includes services that have since been removed from the config.
pub async fn persisted_service_ids(store: &dyn DurableStore) -> Result<Vec<String>, StoreError> {
    let mut ids: Vec<String> = store
        .keys()
        .await?
        .iter()
        .filter_map(|key| service_id_from_state_key(key))
        .map(str::to_string)
        .collect();
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_alarm_name_round_trip() {
        assert_eq!(alarm_name("llm"), "circuit_breaker_recovery:llm");
        assert_eq!(service_id_from_alarm(&alarm_name("llm")), Some("llm"));
    }

    #[test]
    fn test_foreign_alarms_are_rejected() {
        assert_eq!(service_id_from_alarm("cost_ledger_flush"), None);
        assert_eq!(service_id_from_alarm(ALARM_PREFIX), None);
        assert_eq!(service_id_from_alarm("circuit_breaker:stt"), None);
    }

    #[test]
    fn test_state_key() {
        assert_eq!(state_key("stt"), "circuit_breaker:stt");
    }

    #[tokio::test]
    async fn test_persisted_service_ids_skips_foreign_keys() {
        let store = MemoryStore::new();
        store.set(&state_key("stt"), json!({})).await.unwrap();
        store.set(&state_key("asr_legacy"), json!({})).await.unwrap();
        store.set("cost_ledger:2026-10", json!({})).await.unwrap();
        store.set(STATE_KEY_PREFIX, json!({})).await.unwrap();

        assert_eq!(
            persisted_service_ids(&store).await.unwrap(),
            vec!["asr_legacy", "stt"]
        );
    }
}
