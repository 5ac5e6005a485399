//! Durable timers (alarms) that outlive the process that scheduled them.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker opens
//!     → DurableTimers::cancel(name) + schedule(name, recovery_timeout)
//!     → deadline stored as absolute epoch millis (memory.rs / file.rs)
//!
//! run_alarm_pump (every poll interval):
//!     → DurableTimers::take_due()
//!     → alarm name sent on the "timer fired" channel
//!     → BreakerRegistry::dispatch_alarms → CircuitBreaker::on_recovery_alarm
//! ```
//!
//! # Design Decisions
//! - Deadlines are absolute so an alarm whose delay elapsed while the process
//!   was dead fires on the first poll after restart
//! - Scheduling a name that already exists replaces it (one alarm per name)
//! - The fired channel exists before any breaker does, so early fires queue

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::TimerError;

pub use file::FileTimers;
pub use memory::MemoryTimers;

/// An alarm waiting to fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAlarm {
    pub name: String,
    /// Deadline in epoch milliseconds.
    pub due_at_ms: u64,
}

/// Scheduler whose alarms survive process death.
#[async_trait]
pub trait DurableTimers: Send + Sync {
    /// Schedule `name` to fire after `delay`, replacing any alarm with that name.
    async fn schedule(&self, name: &str, delay: Duration) -> Result<(), TimerError>;

    /// Remove the alarm `name` if it is pending.
    async fn cancel(&self, name: &str) -> Result<(), TimerError>;

    /// Remove and return every alarm whose deadline has passed.
    async fn take_due(&self) -> Result<Vec<String>, TimerError>;

    /// All pending alarms, soonest first.
    async fn pending(&self) -> Result<Vec<PendingAlarm>, TimerError>;
}

/// Poll `timers` and forward fired alarm names to `fired` until shutdown.
pub async fn run_alarm_pump(
    timers: Arc<dyn DurableTimers>,
    poll_interval: Duration,
    fired: mpsc::UnboundedSender<String>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(poll_interval_ms = poll_interval.as_millis() as u64, "Alarm pump starting");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match timers.take_due().await {
                    Ok(names) => {
                        for name in names {
                            tracing::debug!(alarm = %name, "Alarm fired");
                            if fired.send(name).is_err() {
                                tracing::warn!("Alarm receiver dropped, stopping pump");
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to poll durable timers"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Alarm pump received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Keep the alarms whose deadline is `<= now`, soonest first.
pub(crate) fn split_due<'a>(
    alarms: impl Iterator<Item = (&'a String, &'a u64)>,
    now_ms: u64,
) -> Vec<(String, u64)> {
    let mut due: Vec<(String, u64)> = alarms
        .filter(|(_, due_at)| **due_at <= now_ms)
        .map(|(name, due_at)| (name.clone(), *due_at))
        .collect();
    due.sort_by_key(|(_, due_at)| *due_at);
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::Shutdown;

    #[tokio::test]
    async fn test_pump_forwards_due_alarms() {
        let clock = Arc::new(ManualClock::new(0));
        let timers = Arc::new(MemoryTimers::new(clock.clone()));
        timers.schedule("a", Duration::from_millis(100)).await.unwrap();
        timers.schedule("b", Duration::from_millis(10_000)).await.unwrap();
        clock.advance(500);

        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(run_alarm_pump(
            timers.clone(),
            Duration::from_millis(5),
            tx,
            shutdown.subscribe(),
        ));

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(fired.as_deref(), Some("a"));

        shutdown.trigger();
        pump.await.unwrap();
        assert_eq!(timers.due_at("b"), Some(10_000));
    }
}
