//! Registry of breakers, one per service.
//!
//! # Responsibilities
//! - Construct and rehydrate every configured breaker at startup
//! - Add breakers lazily for services that appear later
//! - Route fired recovery alarms to the owning breaker
//! - Fan a single state-change listener out to every breaker

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::clock::Clock;
use crate::error::{BreakerError, BreakerResult};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, StateChangeListener};
use crate::resilience::service_id_from_alarm;
use crate::resilience::state::CircuitState;
use crate::storage::DurableStore;
use crate::timers::DurableTimers;

/// Holds exactly one [`CircuitBreaker`] per service id.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    store: Arc<dyn DurableStore>,
    timers: Arc<dyn DurableTimers>,
    clock: Arc<dyn Clock>,
    listener: ArcSwapOption<StateChangeListener>,
    /// Serializes construction + rehydration so a service never gets two breakers.
    registration: Mutex<()>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new(
        store: Arc<dyn DurableStore>,
        timers: Arc<dyn DurableTimers>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            store,
            timers,
            clock,
            listener: ArcSwapOption::empty(),
            registration: Mutex::new(()),
        }
    }

    /// Create a registry holding a rehydrated breaker for every config.
    pub async fn bootstrap(
        configs: &[CircuitBreakerConfig],
        store: Arc<dyn DurableStore>,
        timers: Arc<dyn DurableTimers>,
        clock: Arc<dyn Clock>,
    ) -> BreakerResult<Self> {
        let registry = Self::new(store, timers, clock);
        registry.register_all(configs).await?;
        Ok(registry)
    }

    /// Register every config in order, stopping at the first failure.
    ///
    /// Install the listener first if transitions taken during rehydration
    /// (Open → Half-Open after downtime) must be observed.
    pub async fn register_all(&self, configs: &[CircuitBreakerConfig]) -> BreakerResult<()> {
        for config in configs {
            self.register(config.clone()).await?;
        }

        tracing::info!(services = self.len(), "Breaker registry bootstrapped");
        Ok(())
    }

    /// Return the breaker for `config.service_id`, building and rehydrating it
    /// on first use. An existing breaker keeps its original configuration.
    pub async fn register(&self, config: CircuitBreakerConfig) -> BreakerResult<Arc<CircuitBreaker>> {
        let _guard = self.registration.lock().await;

        if let Some(existing) = self.get(&config.service_id) {
            if existing.config() != &config {
                tracing::warn!(
                    service = %config.service_id,
                    "Breaker already registered, ignoring changed configuration"
                );
            }
            return Ok(existing);
        }

        let breaker = Arc::new(CircuitBreaker::new(
            config,
            self.store.clone(),
            self.timers.clone(),
            self.clock.clone(),
        ));
        if let Some(listener) = self.listener.load_full() {
            breaker.set_on_state_change(move |id, state| (*listener)(id, state));
        }

        breaker.rehydrate().await?;

        tracing::info!(
            service = %breaker.service_id(),
            state = %breaker.state(),
            "Breaker registered"
        );
        self.breakers
            .insert(breaker.service_id().to_string(), breaker.clone());
        Ok(breaker)
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service_id).map(|r| r.value().clone())
    }

    /// Like [`get`](Self::get) but an unknown service is an error.
    pub fn require(&self, service_id: &str) -> BreakerResult<Arc<CircuitBreaker>> {
        self.get(service_id)
            .ok_or_else(|| BreakerError::UnknownService(service_id.to_string()))
    }

    /// Registered service ids, sorted.
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.breakers.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Install `f` on every current and future breaker.
    pub fn set_on_state_change<F>(&self, f: F)
    where
        F: Fn(&str, CircuitState) + Send + Sync + 'static,
    {
        let listener: StateChangeListener = Box::new(f);
        let listener = Arc::new(listener);
        self.listener.store(Some(listener.clone()));

        for entry in self.breakers.iter() {
            let listener = listener.clone();
            entry
                .value()
                .set_on_state_change(move |id, state| (*listener)(id, state));
        }
    }

    /// Route a fired durable alarm to its breaker.
    ///
    /// Alarms for other subsystems or unknown services are logged and dropped.
    pub async fn handle_alarm(&self, name: &str) -> BreakerResult<()> {
        let Some(service_id) = service_id_from_alarm(name) else {
            tracing::debug!(alarm = %name, "Ignoring alarm not owned by a breaker");
            return Ok(());
        };

        match self.get(service_id) {
            Some(breaker) => breaker.on_recovery_alarm().await,
            None => {
                tracing::warn!(
                    alarm = %name,
                    service = %service_id,
                    "Recovery alarm for unregistered service"
                );
                Ok(())
            }
        }
    }

    /// Consume fired alarm names until the channel closes or shutdown.
    pub async fn dispatch_alarms(
        self: Arc<Self>,
        mut fired: mpsc::UnboundedReceiver<String>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                name = fired.recv() => {
                    let Some(name) = name else {
                        tracing::info!("Alarm channel closed, dispatcher exiting");
                        break;
                    };
                    if let Err(e) = self.handle_alarm(&name).await {
                        tracing::error!(alarm = %name, error = %e, "Failed to handle recovery alarm");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Alarm dispatcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
