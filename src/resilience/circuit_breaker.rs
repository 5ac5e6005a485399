//! Circuit breaker for an external dependent service.
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: recovery alarm fires, or rehydrate finds the deadline elapsed
//! Half-Open → Closed: consecutive successes >= half_open_success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-service breaker (not global)
//! - Every mutation persists the whole projection before it resolves
//! - Mutations are serialized by an async mutex held across the write;
//!   `allow_request` reads an atomic mirror and never waits
//! - The recovery alarm is a durable timer, and `rehydrate` is a second,
//!   idempotent path to the same Half-Open transition
//! - Half-Open admits every caller; probes are not limited to one in flight

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::{BreakerResult, StoreError};
use crate::observability::metrics;
use crate::resilience::state::{CircuitState, PersistedCircuitState};
use crate::resilience::{alarm_name, state_key};
use crate::storage::DurableStore;
use crate::timers::DurableTimers;

/// Per-service breaker configuration. Immutable once the breaker is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Unique key of the protected service.
    pub service_id: String,
    /// Consecutive failures in Closed needed to open.
    pub failure_threshold: u32,
    /// Minimum dwell time in Open before recovery is attempted.
    pub recovery_timeout_ms: u64,
    /// Consecutive successes in Half-Open needed to close.
    pub half_open_success_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn new(
        service_id: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout_ms: u64,
        half_open_success_threshold: u32,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            failure_threshold,
            recovery_timeout_ms,
            half_open_success_threshold,
        }
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Callback invoked with `(service_id, new_state)` on every transition.
pub type StateChangeListener = Box<dyn Fn(&str, CircuitState) + Send + Sync>;

/// What a transition does to the recovery alarm.
enum AlarmAction {
    Arm(Duration),
    Clear,
}

/// Circuit breaker whose state survives process restarts.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state_key: String,
    alarm_name: String,
    store: Arc<dyn DurableStore>,
    timers: Arc<dyn DurableTimers>,
    clock: Arc<dyn Clock>,
    /// Lock-free mirror of `inner.state` for `allow_request`.
    state: AtomicU8,
    inner: Mutex<PersistedCircuitState>,
    listener: ArcSwapOption<StateChangeListener>,
}

impl CircuitBreaker {
    /// Build a Closed breaker. Does not touch storage; call [`rehydrate`](Self::rehydrate).
    pub fn new(
        config: CircuitBreakerConfig,
        store: Arc<dyn DurableStore>,
        timers: Arc<dyn DurableTimers>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state_key: state_key(&config.service_id),
            alarm_name: alarm_name(&config.service_id),
            config,
            store,
            timers,
            clock,
            state: AtomicU8::new(CircuitState::Closed as u8),
            inner: Mutex::new(PersistedCircuitState::default()),
            listener: ArcSwapOption::empty(),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.config.service_id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Never waits on a pending mutation.
    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    /// False only while Open.
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Copy of the current projection.
    pub async fn snapshot(&self) -> PersistedCircuitState {
        self.inner.lock().await.clone()
    }

    /// Replace the state-change callback.
    pub fn set_on_state_change<F>(&self, f: F)
    where
        F: Fn(&str, CircuitState) + Send + Sync + 'static,
    {
        let listener: StateChangeListener = Box::new(f);
        self.listener.store(Some(Arc::new(listener)));
    }

    /// Record a successful call to the protected service.
    pub async fn record_success(&self) -> BreakerResult<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count == 0 {
                    return Ok(());
                }
                inner.failure_count = 0;
                self.persist(&inner).await
            }
            CircuitState::HalfOpen => {
                inner.success_count = inner.success_count.saturating_add(1);

                tracing::debug!(
                    service = %self.config.service_id,
                    successes = inner.success_count,
                    threshold = self.config.half_open_success_threshold,
                    "Circuit breaker success in half-open state"
                );

                if inner.success_count < self.config.half_open_success_threshold {
                    return self.persist(&inner).await;
                }

                tracing::info!(
                    service = %self.config.service_id,
                    "Circuit breaker closing after successful recovery"
                );
                inner.close();
                self.commit_transition(&inner, CircuitState::HalfOpen, AlarmAction::Clear)
                    .await
            }
            CircuitState::Open => {
                tracing::debug!(
                    service = %self.config.service_id,
                    "Success reported while circuit is open, ignoring"
                );
                Ok(())
            }
        }
    }

    /// Record a failed call to the protected service.
    pub async fn record_failure(&self) -> BreakerResult<()> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now_ms();
        inner.last_failure_time = now;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);

                tracing::warn!(
                    service = %self.config.service_id,
                    failures = inner.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure in closed state"
                );

                if inner.failure_count < self.config.failure_threshold {
                    return self.persist(&inner).await;
                }

                tracing::error!(
                    service = %self.config.service_id,
                    "Circuit breaker opening due to consecutive failures"
                );
                inner.trip(now);
                let arm = AlarmAction::Arm(self.config.recovery_timeout());
                self.commit_transition(&inner, CircuitState::Closed, arm).await
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    service = %self.config.service_id,
                    "Circuit breaker reopening due to failure in half-open state"
                );
                inner.trip(now);
                let arm = AlarmAction::Arm(self.config.recovery_timeout());
                self.commit_transition(&inner, CircuitState::HalfOpen, arm).await
            }
            CircuitState::Open => self.persist(&inner).await,
        }
    }

    /// Move Open → Half-Open. A no-op in any other state, so stale or
    /// duplicate alarm fires are harmless.
    pub async fn transition_to_half_open(&self) -> BreakerResult<()> {
        let mut inner = self.inner.lock().await;
        self.enter_half_open(&mut inner).await
    }

    /// Handle a fired recovery alarm.
    ///
    /// An alarm that arrives before `openedAt + recovery_timeout` belongs to an
    /// older opening or a skewed clock; it is re-armed for the remainder
    /// instead of ending the dwell time early.
    pub async fn on_recovery_alarm(&self) -> BreakerResult<()> {
        let mut inner = self.inner.lock().await;

        if let (CircuitState::Open, Some(opened_at)) = (inner.state, inner.opened_at) {
            let remaining = self.remaining_open_ms(opened_at);
            if remaining > 0 {
                tracing::debug!(
                    service = %self.config.service_id,
                    remaining_ms = remaining,
                    "Recovery alarm fired before deadline, re-arming"
                );
                return self.arm_recovery_alarm(Duration::from_millis(remaining)).await;
            }
        }

        if inner.state == CircuitState::Open {
            metrics::record_alarm_fired(&self.config.service_id);
        }
        self.enter_half_open(&mut inner).await
    }

    /// Load the persisted projection and make it the live state.
    ///
    /// With nothing stored the breaker stays Closed. A restored Open breaker
    /// whose deadline already passed moves to Half-Open immediately; one
    /// still inside its dwell time gets its alarm re-armed for the remainder.
    pub async fn rehydrate(&self) -> BreakerResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(value) = self.store.get(&self.state_key).await? else {
            tracing::debug!(
                service = %self.config.service_id,
                "No persisted circuit state, starting closed"
            );
            return Ok(());
        };

        let mut restored: PersistedCircuitState =
            serde_json::from_value(value).map_err(StoreError::from)?;
        let repaired = restored.normalize(self.clock.now_ms());

        *inner = restored;
        self.state.store(inner.state as u8, Ordering::Release);
        metrics::record_state(&self.config.service_id, inner.state);

        tracing::info!(
            service = %self.config.service_id,
            state = %inner.state,
            failures = inner.failure_count,
            successes = inner.success_count,
            opened_at = ?inner.opened_at,
            "Circuit state rehydrated"
        );

        if repaired {
            tracing::warn!(
                service = %self.config.service_id,
                "Persisted circuit state violated invariants and was repaired"
            );
            self.persist(&inner).await?;
        }

        if let (CircuitState::Open, Some(opened_at)) = (inner.state, inner.opened_at) {
            let remaining = self.remaining_open_ms(opened_at);
            if remaining == 0 {
                tracing::info!(
                    service = %self.config.service_id,
                    "Recovery deadline elapsed while offline"
                );
                return self.enter_half_open(&mut inner).await;
            }
            return self.arm_recovery_alarm(Duration::from_millis(remaining)).await;
        }

        Ok(())
    }

    async fn enter_half_open(&self, inner: &mut PersistedCircuitState) -> BreakerResult<()> {
        if inner.state != CircuitState::Open {
            tracing::debug!(
                service = %self.config.service_id,
                state = %inner.state,
                "Ignoring half-open transition, circuit is not open"
            );
            return Ok(());
        }

        tracing::info!(
            service = %self.config.service_id,
            "Circuit breaker transitioning to half-open"
        );
        inner.probe();
        self.commit_transition(inner, CircuitState::Open, AlarmAction::Clear)
            .await
    }

    /// Publish, persist, fix up the alarm and notify.
    ///
    /// The in-memory state has already advanced; a storage or timer error is
    /// returned to the caller but the listener still hears about the transition.
    async fn commit_transition(
        &self,
        inner: &PersistedCircuitState,
        from: CircuitState,
        alarm: AlarmAction,
    ) -> BreakerResult<()> {
        self.state.store(inner.state as u8, Ordering::Release);
        metrics::record_transition(&self.config.service_id, from, inner.state);

        let persisted = self.persist(inner).await;
        let alarmed = match alarm {
            AlarmAction::Arm(delay) => self.arm_recovery_alarm(delay).await,
            AlarmAction::Clear => self
                .timers
                .cancel(&self.alarm_name)
                .await
                .map_err(Into::into),
        };

        self.notify(inner.state);
        persisted.and(alarmed)
    }

    async fn persist(&self, inner: &PersistedCircuitState) -> BreakerResult<()> {
        let value = serde_json::to_value(inner).map_err(StoreError::from)?;
        if let Err(e) = self.store.set(&self.state_key, value).await {
            tracing::error!(
                service = %self.config.service_id,
                error = %e,
                "Failed to persist circuit state"
            );
            metrics::record_persist_failure(&self.config.service_id);
            return Err(e.into());
        }
        Ok(())
    }

    async fn arm_recovery_alarm(&self, delay: Duration) -> BreakerResult<()> {
        self.timers.cancel(&self.alarm_name).await?;
        self.timers.schedule(&self.alarm_name, delay).await?;
        tracing::debug!(
            service = %self.config.service_id,
            alarm = %self.alarm_name,
            delay_ms = delay.as_millis() as u64,
            "Recovery alarm armed"
        );
        Ok(())
    }

    fn remaining_open_ms(&self, opened_at: u64) -> u64 {
        let elapsed = self.clock.now_ms().saturating_sub(opened_at);
        self.config.recovery_timeout_ms.saturating_sub(elapsed)
    }

    fn notify(&self, state: CircuitState) {
        if let Some(listener) = self.listener.load_full() {
            (*listener)(&self.config.service_id, state);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service_id", &self.config.service_id)
            .field("state", &self.state())
            .finish()
    }
}
