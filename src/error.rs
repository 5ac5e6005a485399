//! Error types shared by the storage, timer and breaker layers.

use thiserror::Error;

/// Errors raised by a [`DurableStore`](crate::storage::DurableStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the operation (outage, read-only, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`DurableTimers`](crate::timers::DurableTimers) service.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timer serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timer service unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to breaker callers.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// Persisting or loading the breaker projection failed.
    #[error("durable store error: {0}")]
    Store(#[from] StoreError),

    /// Scheduling or cancelling the recovery alarm failed.
    #[error("durable timer error: {0}")]
    Timer(#[from] TimerError),

    /// No breaker is registered for the given service.
    #[error("unknown service: {0}")]
    UnknownService(String),
}

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BreakerError::UnknownService("stt".into());
        assert_eq!(err.to_string(), "unknown service: stt");

        let err = BreakerError::from(StoreError::Unavailable("disk full".into()));
        assert_eq!(
            err.to_string(),
            "durable store error: store unavailable: disk full"
        );
    }

    #[test]
    fn test_serde_error_converts_into_store_error() {
        let parse = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: BreakerError = StoreError::from(parse).into();
        assert!(matches!(err, BreakerError::Store(StoreError::Serialization(_))));
    }
}
