//! Durable circuit breakers for flaky external services.
//!
//! Breakers protect outbound calls (speech-to-text, LLM endpoints) and keep
//! their state in a durable store, so a host process that is killed and
//! restarted at any instant comes back with the same breaker states and
//! pending recovery alarms.

pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod storage;
pub mod timers;

pub use config::AppConfig;
pub use error::{BreakerError, BreakerResult};
pub use lifecycle::Shutdown;
pub use resilience::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
