//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, timers and storage produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (transition counters, state gauges)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for machines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every log event carries the service id as a field
//! - Metrics are cheap; recording never fails the caller
//! - The exporter is opt-in; without it metric calls are no-ops

pub mod logging;
pub mod metrics;
