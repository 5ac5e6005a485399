//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Unique, non-empty service ids
//! - Positive thresholds, timeouts and poll interval
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, service) in config.services.iter().enumerate() {
        let field = |name: &str| format!("services[{}].{}", i, name);

        if service.service_id.trim().is_empty() {
            errors.push(ValidationError::new(field("service_id"), "must not be empty"));
        } else if !seen.insert(service.service_id.as_str()) {
            errors.push(ValidationError::new(
                field("service_id"),
                format!("duplicate service id '{}'", service.service_id),
            ));
        }
        if service.failure_threshold == 0 {
            errors.push(ValidationError::new(field("failure_threshold"), "must be > 0"));
        }
        if service.recovery_timeout_ms == 0 {
            errors.push(ValidationError::new(field("recovery_timeout_ms"), "must be > 0"));
        }
        if service.half_open_success_threshold == 0 {
            errors.push(ValidationError::new(
                field("half_open_success_threshold"),
                "must be > 0",
            ));
        }
    }

    if config.timers.poll_interval_ms == 0 {
        errors.push(ValidationError::new("timers.poll_interval_ms", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = AppConfig::default();
        config.services = vec![
            CircuitBreakerConfig::new("stt", 0, 1_000, 1),
            CircuitBreakerConfig::new("stt", 1, 0, 0),
            CircuitBreakerConfig::new(" ", 1, 1_000, 1),
        ];
        config.timers.poll_interval_ms = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "services[0].failure_threshold",
                "services[1].service_id",
                "services[1].recovery_timeout_ms",
                "services[1].half_open_success_threshold",
                "services[2].service_id",
                "timers.poll_interval_ms",
                "observability.metrics_address",
            ]
        );
        assert!(errors[1].to_string().contains("duplicate"));
    }
}
