//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open store → Open timers → Alarm channel + pump
//!     → Bootstrap registry (rehydrate every breaker) → Alarm dispatcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → pump and dispatcher exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - The alarm channel exists before any breaker, so no fire is missed
//! - Startup is fail fast: a store or rehydration error is fatal
//! - Nothing needs draining on shutdown; durable state is already written

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Runtime};
