//! File-backed alarm table.
//!
//! Deadlines are written to a JSON document after every change, so alarms
//! scheduled by a process that has since died still fire (late) once a new
//! process opens the same file and starts polling.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::TimerError;
use crate::storage::file::write_atomically;
use crate::timers::{split_due, DurableTimers, PendingAlarm};

pub struct FileTimers {
    path: PathBuf,
    alarms: Mutex<BTreeMap<String, u64>>,
    clock: Arc<dyn Clock>,
}

impl FileTimers {
    /// Open the alarm table at `path`, loading pending alarms if the file exists.
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, TimerError> {
        let path = path.as_ref().to_path_buf();
        let alarms: BTreeMap<String, u64> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let now = clock.now_ms();
        let overdue = alarms.values().filter(|due_at| **due_at <= now).count();
        tracing::info!(path = ?path, pending = alarms.len(), overdue, "Durable timers opened");

        Ok(Self {
            path,
            alarms: Mutex::new(alarms),
            clock,
        })
    }

    async fn flush(&self, alarms: &BTreeMap<String, u64>) -> Result<(), TimerError> {
        write_atomically(&self.path, &serde_json::to_vec_pretty(alarms)?).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableTimers for FileTimers {
    // Every change is written from a copy and only committed once it is on
    // disk, so the in-memory table never runs ahead of the file.

    async fn schedule(&self, name: &str, delay: Duration) -> Result<(), TimerError> {
        let due_at = self.clock.now_ms().saturating_add(delay.as_millis() as u64);
        let mut alarms = self.alarms.lock().await;

        let mut next = alarms.clone();
        next.insert(name.to_string(), due_at);
        self.flush(&next).await?;
        *alarms = next;
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<(), TimerError> {
        let mut alarms = self.alarms.lock().await;
        if !alarms.contains_key(name) {
            return Ok(());
        }

        let mut next = alarms.clone();
        next.remove(name);
        self.flush(&next).await?;
        *alarms = next;
        Ok(())
    }

    async fn take_due(&self) -> Result<Vec<String>, TimerError> {
        let mut alarms = self.alarms.lock().await;
        let due = split_due(alarms.iter(), self.clock.now_ms());
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let mut next = alarms.clone();
        for (name, _) in &due {
            next.remove(name);
        }
        // On failure the due alarms stay put and are offered again next poll.
        self.flush(&next).await?;
        *alarms = next;
        Ok(due.into_iter().map(|(name, _)| name).collect())
    }

    async fn pending(&self) -> Result<Vec<PendingAlarm>, TimerError> {
        let alarms = self.alarms.lock().await;
        let mut pending: Vec<PendingAlarm> = alarms
            .iter()
            .map(|(name, due_at)| PendingAlarm {
                name: name.clone(),
                due_at_ms: *due_at,
            })
            .collect();
        pending.sort_by_key(|a| a.due_at_ms);
        Ok(pending)
    }
}
