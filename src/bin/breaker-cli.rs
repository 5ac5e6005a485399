use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use durable_breaker::clock::{Clock, SystemClock};
use durable_breaker::config::{load_config, AppConfig};
use durable_breaker::lifecycle::startup::open_backends;
use durable_breaker::resilience::{
    persisted_service_ids, service_id_from_alarm, state_key, BreakerRegistry,
};
use durable_breaker::storage::DurableStore;
use durable_breaker::timers::DurableTimers;

#[derive(Parser)]
#[command(name = "breaker-cli")]
#[command(about = "Inspect and drive durable circuit breakers", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the persisted state of every configured service
    Status,
    /// List pending recovery alarms
    Alarms,
    /// Rehydrate a breaker and record one call outcome
    Record {
        service: String,
        #[arg(value_enum)]
        outcome: Outcome,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Success,
    Failure,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (store, timers) = open_backends(&config, clock.clone()).await?;

    match cli.command {
        Commands::Status => {
            let mut services = Vec::new();
            for service in &config.services {
                let persisted = store.get(&state_key(&service.service_id)).await?;
                services.push(json!({
                    "service": service.service_id,
                    "configured": true,
                    "persisted": persisted,
                }));
            }

            // State left behind by services no longer in the config.
            for id in persisted_service_ids(store.as_ref()).await? {
                if config.services.iter().any(|s| s.service_id == id) {
                    continue;
                }
                let persisted = store.get(&state_key(&id)).await?;
                services.push(json!({
                    "service": id,
                    "configured": false,
                    "persisted": persisted,
                }));
            }
            println!("{}", serde_json::to_string_pretty(&services)?);
        }
        Commands::Alarms => {
            let now = clock.now_ms();
            let alarms: Vec<_> = timers
                .pending()
                .await?
                .into_iter()
                .map(|alarm| {
                    json!({
                        "alarm": alarm.name,
                        "service": service_id_from_alarm(&alarm.name),
                        "due_at_ms": alarm.due_at_ms,
                        "remaining_ms": alarm.due_at_ms.saturating_sub(now),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&alarms)?);
        }
        Commands::Record { service, outcome } => {
            let registry =
                BreakerRegistry::bootstrap(&config.services, store, timers, clock).await?;
            let breaker = registry.require(&service)?;

            match outcome {
                Outcome::Success => breaker.record_success().await?,
                Outcome::Failure => breaker.record_failure().await?,
            }

            println!("{}", serde_json::to_string_pretty(&breaker.snapshot().await)?);
        }
    }

    Ok(())
}
