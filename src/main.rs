//! Sharpline - real-time sports-betting decision engine
//!
//! Boots the runtime: document store, event bus (in-process or broker),
//! agent orchestrator, and the three-wave scheduler. Shuts down cleanly on
//! ctrl-c: scheduler loops first, then the bus listener, then the store.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use sharpline_backend::adapters::OddsApiClient;
use sharpline_backend::bus::{BrokerBus, InMemoryBus, SharedBus};
use sharpline_backend::orchestrator::{get_orchestrator, shutdown_orchestrator};
use sharpline_backend::scheduler::{SchedulerConfig, ThreeWaveScheduler};
use sharpline_backend::sim::StoredSimulationClient;
use sharpline_backend::sport::Sport;
use sharpline_backend::store::{SharedStore, SqliteDocumentStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sharpline", about = "Real-time sports-betting decision engine")]
struct Cli {
    /// Path to the SQLite document store.
    #[arg(long, env = "SHARPLINE_DB_PATH", default_value = "sharpline.db")]
    db_path: String,

    /// WebSocket broker URL; omit to run the in-process bus.
    #[arg(long, env = "SHARPLINE_BROKER_URL")]
    broker_url: Option<String>,

    /// Odds provider API keys (rotated on quota exhaustion).
    #[arg(long, env = "ODDS_API_KEYS", value_delimiter = ',')]
    odds_api_keys: Vec<String>,

    /// Sports to sweep.
    #[arg(long, env = "SHARPLINE_SPORTS", value_delimiter = ',', default_value = "nba,nfl,mlb,nhl")]
    sports: Vec<String>,

    /// Odds provider region.
    #[arg(long, env = "SHARPLINE_REGION", default_value = "us")]
    region: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(db_path = %cli.db_path, "sharpline starting");

    let store: SharedStore =
        Arc::new(SqliteDocumentStore::open(&cli.db_path).context("open document store")?);
    store.ping().await.context("store ping")?;

    let bus: SharedBus = match &cli.broker_url {
        Some(url) => {
            info!(url = %url, "using broker transport");
            Arc::new(BrokerBus::new(url))
        }
        None => {
            info!("using in-process bus");
            Arc::new(InMemoryBus::new())
        }
    };

    let orchestrator = get_orchestrator(bus, store.clone()).await?;

    // The scheduler only runs when an odds provider is configured.
    if cli.odds_api_keys.is_empty() {
        warn!("no odds API keys configured; three-wave scheduler disabled");
    } else {
        let sports: Vec<Sport> = cli
            .sports
            .iter()
            .filter_map(|s| Sport::parse(s))
            .collect();
        let odds = Arc::new(OddsApiClient::new(cli.odds_api_keys.clone())?);
        let simulations = Arc::new(StoredSimulationClient::new(store.clone()));
        let scheduler = Arc::new(ThreeWaveScheduler::new(
            store,
            odds,
            simulations,
            orchestrator.signal_manager(),
            orchestrator.bus(),
            SchedulerConfig {
                sports,
                region: cli.region.clone(),
                ..SchedulerConfig::default()
            },
            orchestrator.shutdown_signal(),
        ));
        orchestrator.adopt_tasks(scheduler.start());
    }

    info!("sharpline online; ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;

    shutdown_orchestrator().await;
    info!("goodbye");
    Ok(())
}
