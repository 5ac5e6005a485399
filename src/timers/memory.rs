//! In-process alarm table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::error::TimerError;
use crate::timers::{split_due, DurableTimers, PendingAlarm};

pub struct MemoryTimers {
    alarms: DashMap<String, u64>,
    clock: Arc<dyn Clock>,
}

impl MemoryTimers {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            alarms: DashMap::new(),
            clock,
        }
    }

    /// Deadline of the alarm `name`, if pending.
    pub fn due_at(&self, name: &str) -> Option<u64> {
        self.alarms.get(name).map(|r| *r.value())
    }
}

#[async_trait]
impl DurableTimers for MemoryTimers {
    async fn schedule(&self, name: &str, delay: Duration) -> Result<(), TimerError> {
        let due_at = self.clock.now_ms().saturating_add(delay.as_millis() as u64);
        self.alarms.insert(name.to_string(), due_at);
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<(), TimerError> {
        self.alarms.remove(name);
        Ok(())
    }

    async fn take_due(&self) -> Result<Vec<String>, TimerError> {
        let now = self.clock.now_ms();
        let due: Vec<(String, u64)> = {
            let snapshot: Vec<(String, u64)> = self
                .alarms
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect();
            split_due(snapshot.iter().map(|(n, d)| (n, d)), now)
        };

        // Only remove the exact deadline we observed; a concurrent reschedule wins.
        Ok(due
            .into_iter()
            .filter(|(name, due_at)| self.alarms.remove_if(name, |_, v| v == due_at).is_some())
            .map(|(name, _)| name)
            .collect())
    }

    async fn pending(&self) -> Result<Vec<PendingAlarm>, TimerError> {
        let mut alarms: Vec<PendingAlarm> = self
            .alarms
            .iter()
            .map(|r| PendingAlarm {
                name: r.key().clone(),
                due_at_ms: *r.value(),
            })
            .collect();
        alarms.sort_by_key(|a| a.due_at_ms);
        Ok(alarms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_schedule_replaces_existing_alarm() {
        let clock = Arc::new(ManualClock::new(1_000));
        let timers = MemoryTimers::new(clock.clone());

        timers.schedule("x", Duration::from_millis(500)).await.unwrap();
        clock.advance(100);
        timers.schedule("x", Duration::from_millis(500)).await.unwrap();

        assert_eq!(timers.due_at("x"), Some(1_600));
        assert_eq!(timers.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_take_due_removes_only_elapsed() {
        let clock = Arc::new(ManualClock::new(0));
        let timers = MemoryTimers::new(clock.clone());
        timers.schedule("late", Duration::from_millis(300)).await.unwrap();
        timers.schedule("early", Duration::from_millis(100)).await.unwrap();
        timers.schedule("never", Duration::from_millis(10_000)).await.unwrap();

        assert!(timers.take_due().await.unwrap().is_empty());

        clock.advance(300);
        assert_eq!(timers.take_due().await.unwrap(), vec!["early", "late"]);
        assert!(timers.take_due().await.unwrap().is_empty());
        assert_eq!(timers.due_at("never"), Some(10_000));
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let clock = Arc::new(ManualClock::new(0));
        let timers = MemoryTimers::new(clock.clone());
        timers.schedule("x", Duration::from_millis(10)).await.unwrap();
        timers.cancel("x").await.unwrap();
        timers.cancel("x").await.unwrap();

        clock.advance(1_000);
        assert!(timers.take_due().await.unwrap().is_empty());
    }
}
