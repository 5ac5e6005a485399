//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_transitions_total` (counter): transitions by service, from, to
//! - `breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `breaker_persist_failures_total` (counter): failed durable writes
//! - `breaker_alarms_fired_total` (counter): recovery alarms acted on

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::state::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_transition(service: &str, from: CircuitState, to: CircuitState) {
    metrics::counter!(
        "breaker_transitions_total",
        "service" => service.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_state(service, to);
}

pub fn record_state(service: &str, state: CircuitState) {
    metrics::gauge!("breaker_state", "service" => service.to_string()).set(state as u8 as f64);
}

pub fn record_persist_failure(service: &str) {
    metrics::counter!("breaker_persist_failures_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_alarm_fired(service: &str) {
    metrics::counter!("breaker_alarms_fired_total", "service" => service.to_string())
        .increment(1);
}
