//! Durable breaker host (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                        BREAKER HOST                          │
//!     │                                                              │
//!     │   call sites ──▶ BreakerRegistry ──▶ CircuitBreaker (per id) │
//!     │                        ▲                    │                │
//!     │                        │                    ├──▶ DurableStore│
//!     │              alarm dispatcher               │   (projection) │
//!     │                        ▲                    └──▶ DurableTimers
//!     │                        │                        (recovery)   │
//!     │                   alarm pump ◀──────────────────────┘        │
//!     │                                                              │
//!     │   config · observability · lifecycle                         │
//!     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Kill the process at any point; on restart every breaker is rehydrated and
//! alarms that came due while it was down fire on the first poll.

use std::path::PathBuf;

use clap::Parser;

use durable_breaker::config::watcher::ConfigWatcher;
use durable_breaker::config::{load_config, AppConfig};
use durable_breaker::lifecycle::{self, signals, Shutdown};
use durable_breaker::observability::{logging, metrics};
use durable_breaker::resilience::CircuitState;

#[derive(Parser)]
#[command(name = "durable-breaker")]
#[command(about = "Host process for durable circuit breakers", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("durable-breaker v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let runtime = lifecycle::start(
        &config,
        &shutdown,
        Some(Box::new(|service: &str, state: CircuitState| {
            tracing::info!(service = %service, state = %state, "Breaker state changed");
        })),
    )
    .await?;

    // Hot-add services from config reloads.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let registry = runtime.registry.clone();
            tokio::spawn(async move {
                while let Some(services) = updates.recv().await {
                    for service in services {
                        if let Err(e) = registry.register(service).await {
                            tracing::error!(error = %e, "Failed to register service from reload");
                        }
                    }
                }
            });
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start");
                    None
                }
            }
        }
        None => None,
    };

    signals::wait_for_shutdown_signal().await;
    shutdown.trigger();
    runtime.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
