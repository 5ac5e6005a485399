//! Breaker state and its durable projection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: probationary recovery, requests pass and are counted
//!
//! # Projection Invariants
//! - `openedAt` is set if and only if the state is Open
//! - `failureCount` only carries progress while Closed
//! - `successCount` only carries progress while Half-Open

use std::fmt;

use serde::{Deserialize, Serialize};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable, serializable projection of a breaker's live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedCircuitState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Epoch millis of the most recent failure, or 0.
    pub last_failure_time: u64,
    /// Epoch millis of the last transition into Open.
    pub opened_at: Option<u64>,
}

impl Default for PersistedCircuitState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: 0,
            opened_at: None,
        }
    }
}

impl PersistedCircuitState {
    /// Move to Open at `now_ms`.
    pub(crate) fn trip(&mut self, now_ms: u64) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now_ms);
        self.failure_count = 0;
        self.success_count = 0;
    }

    /// Move to Half-Open.
    pub(crate) fn probe(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.opened_at = None;
        self.success_count = 0;
    }

    /// Move to Closed with fresh counters. `last_failure_time` is history and is kept.
    pub(crate) fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.failure_count = 0;
        self.success_count = 0;
    }

    /// Repair a projection that breaks the invariants. Returns true if anything changed.
    pub fn normalize(&mut self, now_ms: u64) -> bool {
        let before = self.clone();
        match self.state {
            CircuitState::Open => {
                if self.opened_at.is_none() {
                    self.opened_at = Some(now_ms);
                }
                self.failure_count = 0;
                self.success_count = 0;
            }
            CircuitState::HalfOpen => {
                self.opened_at = None;
                self.failure_count = 0;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.success_count = 0;
            }
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_circuit_state_from_u8() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        assert_eq!(CircuitState::from(99), CircuitState::Closed);
    }

    #[test]
    fn test_projection_json_shape() {
        let projection = PersistedCircuitState {
            state: CircuitState::Open,
            failure_count: 0,
            success_count: 0,
            last_failure_time: 1_700,
            opened_at: Some(1_700),
        };
        assert_eq!(
            serde_json::to_value(&projection).unwrap(),
            json!({
                "state": "OPEN",
                "failureCount": 0,
                "successCount": 0,
                "lastFailureTime": 1700,
                "openedAt": 1700
            })
        );

        let closed = serde_json::to_value(PersistedCircuitState::default()).unwrap();
        assert_eq!(closed["state"], "CLOSED");
        assert!(closed["openedAt"].is_null());
    }

    #[test]
    fn test_half_open_state_name() {
        let value: PersistedCircuitState =
            serde_json::from_value(json!({"state": "HALF_OPEN", "successCount": 1})).unwrap();
        assert_eq!(value.state, CircuitState::HalfOpen);
        assert_eq!(value.success_count, 1);
        assert_eq!(value.last_failure_time, 0);
    }

    #[test]
    fn test_normalize_repairs_open_without_opened_at() {
        let mut projection = PersistedCircuitState {
            state: CircuitState::Open,
            failure_count: 4,
            ..Default::default()
        };
        assert!(projection.normalize(9_000));
        assert_eq!(projection.opened_at, Some(9_000));
        assert_eq!(projection.failure_count, 0);
    }

    #[test]
    fn test_normalize_leaves_valid_projection_alone() {
        let mut projection = PersistedCircuitState {
            failure_count: 2,
            last_failure_time: 50,
            ..Default::default()
        };
        assert!(!projection.normalize(9_000));

        projection.opened_at = Some(1);
        assert!(projection.normalize(9_000));
        assert_eq!(projection.opened_at, None);
        assert_eq!(projection.failure_count, 2);
    }
}
