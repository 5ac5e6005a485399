//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use durable_breaker::clock::ManualClock;
use durable_breaker::resilience::{
    state_key, CircuitBreaker, CircuitBreakerConfig, CircuitState, PersistedCircuitState,
    StateChangeListener,
};
use durable_breaker::storage::{DurableStore, MemoryStore};
use durable_breaker::timers::MemoryTimers;

pub const START_MS: u64 = 1_700_000_000_000;

/// Durable backends that outlive any single breaker instance.
///
/// Building a new breaker against the same harness is the in-process
/// equivalent of a host restart: all in-memory state is gone, only the
/// store and the alarm table remain.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub timers: Arc<MemoryTimers>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        Self {
            store: Arc::new(MemoryStore::new()),
            timers: Arc::new(MemoryTimers::new(clock.clone())),
            clock,
        }
    }

    /// A fresh, not yet rehydrated breaker.
    pub fn breaker(&self, config: &CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(
            config.clone(),
            self.store.clone(),
            self.timers.clone(),
            self.clock.clone(),
        )
    }

    /// A fresh breaker as a restarted process would build it.
    pub async fn restart(&self, config: &CircuitBreakerConfig) -> CircuitBreaker {
        let breaker = self.breaker(config);
        breaker.rehydrate().await.unwrap();
        breaker
    }

    pub async fn stored(&self, service_id: &str) -> Option<PersistedCircuitState> {
        self.store
            .get(&state_key(service_id))
            .await
            .unwrap()
            .map(|v| serde_json::from_value(v).unwrap())
    }

    pub async fn put(&self, service_id: &str, projection: &PersistedCircuitState) {
        self.store
            .set(&state_key(service_id), serde_json::to_value(projection).unwrap())
            .await
            .unwrap();
    }
}

/// failure_threshold=3, recovery_timeout_ms=1000, half_open_success_threshold=2
pub fn scenario_config(service_id: &str) -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(service_id, 3, 1_000, 2)
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_for<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub fn open_projection(opened_at: u64) -> PersistedCircuitState {
    PersistedCircuitState {
        state: CircuitState::Open,
        failure_count: 0,
        success_count: 0,
        last_failure_time: opened_at,
        opened_at: Some(opened_at),
    }
}

pub type Transitions = Arc<std::sync::Mutex<Vec<(String, CircuitState)>>>;

/// A listener that records every transition it is handed.
pub fn recording_listener() -> (StateChangeListener, Transitions) {
    let seen: Transitions = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: StateChangeListener = Box::new(move |id: &str, state: CircuitState| {
        sink.lock().unwrap().push((id.to_string(), state));
    });
    (listener, seen)
}
