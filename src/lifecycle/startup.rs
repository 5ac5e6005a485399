//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the durable store and durable timers named by the config
//! - Start the alarm pump before any breaker exists
//! - Install the state-change listener, then construct + rehydrate every service
//! - Start the alarm dispatcher

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::schema::{AppConfig, StorageBackend};
use crate::error::BreakerResult;
use crate::lifecycle::Shutdown;
use crate::resilience::{BreakerRegistry, StateChangeListener};
use crate::storage::{DurableStore, FileStore, MemoryStore};
use crate::timers::{run_alarm_pump, DurableTimers, FileTimers, MemoryTimers};

/// Everything a running host needs to keep alive.
pub struct Runtime {
    pub registry: Arc<BreakerRegistry>,
    pub store: Arc<dyn DurableStore>,
    pub timers: Arc<dyn DurableTimers>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Wait for the background tasks to exit (after shutdown was triggered).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task panicked");
            }
        }
    }
}

/// Open the configured durable backends.
pub async fn open_backends(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> BreakerResult<(Arc<dyn DurableStore>, Arc<dyn DurableTimers>)> {
    match config.storage.backend {
        StorageBackend::File => {
            let store: Arc<dyn DurableStore> =
                Arc::new(FileStore::open(&config.storage.state_path).await?);
            let timers: Arc<dyn DurableTimers> =
                Arc::new(FileTimers::open(&config.storage.timers_path, clock).await?);
            Ok((store, timers))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; breaker state will not survive restarts");
            let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
            let timers: Arc<dyn DurableTimers> = Arc::new(MemoryTimers::new(clock));
            Ok((store, timers))
        }
    }
}

/// Start the breaker runtime with the system clock.
pub async fn start(
    config: &AppConfig,
    shutdown: &Shutdown,
    on_state_change: Option<StateChangeListener>,
) -> BreakerResult<Runtime> {
    start_with_clock(config, shutdown, Arc::new(SystemClock), on_state_change).await
}

/// Start the breaker runtime.
///
/// `on_state_change` is installed before any breaker is rehydrated, so it
/// also sees transitions taken while restoring state.
pub async fn start_with_clock(
    config: &AppConfig,
    shutdown: &Shutdown,
    clock: Arc<dyn Clock>,
    on_state_change: Option<StateChangeListener>,
) -> BreakerResult<Runtime> {
    let (store, timers) = open_backends(config, clock.clone()).await?;

    // Fires that arrive while the registry is still rehydrating queue here.
    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let pump = tokio::spawn(run_alarm_pump(
        timers.clone(),
        Duration::from_millis(config.timers.poll_interval_ms),
        fired_tx,
        shutdown.subscribe(),
    ));

    let registry = Arc::new(BreakerRegistry::new(store.clone(), timers.clone(), clock));
    if let Some(listener) = on_state_change {
        registry.set_on_state_change(listener);
    }
    registry.register_all(&config.services).await?;

    let dispatcher = tokio::spawn(registry.clone().dispatch_alarms(fired_rx, shutdown.subscribe()));

    for id in registry.service_ids() {
        if let Some(breaker) = registry.get(&id) {
            tracing::info!(service = %id, state = %breaker.state(), "Breaker ready");
        }
    }

    Ok(Runtime {
        registry,
        store,
        timers,
        tasks: vec![pump, dispatcher],
    })
}
