//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.
//! Every section has defaults so a minimal (even empty) file is valid.

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerConfig;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// One breaker per protected service.
    pub services: Vec<CircuitBreakerConfig>,

    /// Durable store and timer persistence.
    pub storage: StorageConfig,

    /// Alarm polling.
    pub timers: TimerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            services: vec![
                CircuitBreakerConfig::new("stt", 3, 30_000, 2),
                CircuitBreakerConfig::new("llm", 5, 60_000, 2),
            ],
            storage: StorageConfig::default(),
            timers: TimerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Which durable backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files on disk; survives restarts.
    File,
    /// Process memory; for simulations only.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Breaker projections (file backend).
    pub state_path: String,

    /// Pending recovery alarms (file backend).
    pub timers_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            state_path: "data/breakers.json".to_string(),
            timers_path: "data/alarms.json".to_string(),
        }
    }
}

/// Durable timer polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerConfig {
    /// How often pending alarms are checked, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
