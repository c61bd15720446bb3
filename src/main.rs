use anyhow::Context;
use clap::{Parser, Subcommand};
use playscanner::collector::CollectionStatus;
use playscanner::config::Config;
use playscanner::health::HealthStatus;
use playscanner::server::{start_server, AppState};
use playscanner::storage::{CacheStore, SqliteCacheStore};
use playscanner::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "playscanner")]
#[command(about = "Court availability cache and search engine")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./playscanner.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one collection pass and populate the cache
    Collect {
        /// Cities to collect (comma-separated). Defaults to the configured list
        #[arg(long)]
        cities: Option<String>,
    },
    /// Delete expired cache entries and collection runs past retention
    Cleanup,
    /// Print the current health report
    Health {
        #[arg(long)]
        detailed: bool,
    },
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn CacheStore>> {
    let store = SqliteCacheStore::open(&config.storage.db_path)
        .with_context(|| format!("opening cache database at {}", config.storage.db_path))?
        .with_timeout(Duration::from_millis(config.storage.timeout_ms));
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(addr) = config.server.metrics_addr.as_deref() {
        metrics::init_metrics(addr);
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let store = open_store(&config)?;
            let state = AppState::from_config(&config, store)?;
            start_server(state, config.server.port).await?;
        }
        Commands::Collect { cities } => {
            if let Some(list) = cities {
                config.collection.cities = list
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
            let store = open_store(&config)?;
            let state = AppState::from_config(&config, store)?;
            info!("Starting collection for {:?}", config.collection.cities);

            let summary = state.collector.run().await?;
            println!("\n📊 Collection Results:");
            println!("   Status: {:?}", summary.status);
            println!("   Pairs attempted: {}", summary.attempted);
            println!("   Succeeded: {}", summary.succeeded);
            println!("   Errors: {}", summary.errors);
            println!("   Slots collected: {}", summary.total_collected);
            println!("   Unique venues: {}", summary.unique_venues);
            println!("   Time: {}ms", summary.collection_time);
            for run in summary.results.iter().filter(|r| !r.is_success()) {
                println!(
                    "   ❌ {} {}: {}",
                    run.city,
                    run.date,
                    run.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            if summary.status == CollectionStatus::Failed {
                error!("Collection failed for every (city, date) pair");
                std::process::exit(1);
            }
        }
        Commands::Cleanup => {
            let store = open_store(&config)?;
            let removed = store.cleanup().await?;
            let removed_runs = store
                .cleanup_collection_runs(config.health.run_retention_days)
                .await?;
            metrics::cache_cleanup(removed);
            println!("🧹 Removed {removed} expired cache entries and {removed_runs} old collection runs");
        }
        Commands::Health { detailed } => {
            let store = open_store(&config)?;
            let state = AppState::from_config(&config, store)?;
            let report = state.health.report(detailed, None).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status != HealthStatus::Healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
