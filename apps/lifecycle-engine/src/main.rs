//! Lifecycle Engine Binary
//!
//! Runs the configured option strategies unattended until Ctrl-C / SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin lifecycle-engine -- --config config/lifecycle.yaml
//! cargo run --bin lifecycle-engine -- --mode paper --replay frames.jsonl --once
//! ```
//!
//! # Environment Variables
//!
//! - `LIFECYCLE_CONFIG`: Config file path (default: config/lifecycle.yaml)
//! - `UPSTOX_ACCESS_TOKEN`: Broker token, referenced from the config file
//! - `RUST_LOG`: Overrides the configured log filter

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lifecycle_engine::application::context::{ContextSettings, MarketContextBuilder};
use lifecycle_engine::application::controller::{ControllerDeps, StrategyController};
use lifecycle_engine::application::ports::{
    ExecutionPort, MarketFeed, NoOpStateSync, PositionSource, StateSync,
};
use lifecycle_engine::application::runner::{CycleRunner, RunnerSettings};
use lifecycle_engine::config::{Config, DEFAULT_CONFIG_PATH, TradingMode, load_config};
use lifecycle_engine::infrastructure::broker::{
    ExecutorSettings, OrderExecutor, PaperExecution, PaperPositions, RateLimiter, UpstoxHttpClient,
};
use lifecycle_engine::infrastructure::feed::{HttpSnapshotFeed, ReplayFeed};
use lifecycle_engine::infrastructure::holidays;
use lifecycle_engine::infrastructure::journal::CsvTradeJournal;
use lifecycle_engine::infrastructure::persistence::{
    GitStateSync, GitSyncSettings, JsonFileStatePersistence, git_sync,
};
use lifecycle_engine::observability;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "lifecycle-engine", version, about = "Multi-leg index option lifecycle engine")]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, env = "LIFECYCLE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the configured trading mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Replay market frames from a JSON-lines file.
    #[arg(long, value_name = "FILE")]
    replay: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Paper,
    Live,
}

impl From<ModeArg> for TradingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Paper => Self::Paper,
            ModeArg::Live => Self::Live,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv_from_ancestors();
    let cli = Cli::parse();

    let mut config =
        load_config(Some(&cli.config)).with_context(|| format!("failed to load config from {}", cli.config))?;
    if let Some(mode) = cli.mode {
        config.engine.mode = mode.into();
    }
    if let Some(path) = cli.replay {
        config.feed.replay_path = Some(path);
    }

    let _tracing_guard =
        observability::init_tracing(&config.observability.logging).context("failed to initialise tracing")?;
    if let Some(listen) = config.observability.metrics_listen.as_deref() {
        observability::init_metrics(listen).context("failed to start metrics exporter")?;
    }

    let strategies: Vec<&str> = config.engine.active_strategies.iter().map(|k| k.name()).collect();
    tracing::info!(
        mode = %config.engine.mode,
        underlying = %config.engine.underlying,
        strategies = ?strategies,
        "Starting lifecycle engine"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let calendar = Arc::new(holidays::load_calendar(&config.timing).await);
    let (execution, positions) = build_broker(&config)?;
    let feed = build_feed(&config).await?;
    let (sync, sync_handle) = build_sync(&config, shutdown.clone()).await;
    let persistence = Arc::new(JsonFileStatePersistence::new(&config.persistence.state_dir));
    tracing::info!(state_dir = %persistence.dir().display(), "State store ready");

    let mut controllers = Vec::with_capacity(config.engine.active_strategies.len());
    for kind in &config.engine.active_strategies {
        let journal = CsvTradeJournal::open(&config.persistence.journal_dir, kind.name())
            .with_context(|| format!("failed to open trade journal for {}", kind.name()))?;
        let deps = ControllerDeps {
            execution: Arc::clone(&execution),
            persistence: persistence.clone(),
            journal: Arc::new(journal),
            sync: Arc::clone(&sync),
        };
        let mut controller = StrategyController::from_config(*kind, &config, deps, Arc::clone(&calendar));
        if let Err(e) = controller.load_state().await {
            tracing::error!(strategy = kind.name(), error = %e, "Saved state unreadable; starting empty");
        }
        controllers.push(controller);
    }

    let context = MarketContextBuilder::new(ContextSettings::from(&config), calendar);
    let mut runner = CycleRunner::new(controllers, feed, positions, context, RunnerSettings::from(&config));
    runner.run(shutdown.clone(), cli.once).await;

    shutdown.cancel();
    if let Some(handle) = sync_handle
        && let Err(e) = handle.await
    {
        tracing::warn!(error = %e, "State sync worker ended abnormally");
    }

    tracing::info!("Lifecycle engine stopped");
    Ok(())
}

/// PAPER fills locally; LIVE routes through the order workflow.
fn build_broker(config: &Config) -> Result<(Arc<dyn ExecutionPort>, Arc<dyn PositionSource>)> {
    match config.engine.mode {
        TradingMode::Paper => {
            let execution: Arc<dyn ExecutionPort> = Arc::new(PaperExecution);
            let positions: Arc<dyn PositionSource> =
                Arc::new(PaperPositions::new(config.broker.paper_reports_positions));
            Ok((execution, positions))
        }
        TradingMode::Live => {
            let api = UpstoxHttpClient::new(&config.broker).context("failed to create broker client")?;
            let limiter = Arc::new(RateLimiter::new(Duration::from_millis(config.broker.min_call_gap_ms)));
            let executor = Arc::new(OrderExecutor::new(
                Arc::new(api),
                limiter,
                ExecutorSettings::from(&config.broker),
            ));
            let execution: Arc<dyn ExecutionPort> = executor.clone();
            let positions: Arc<dyn PositionSource> = executor;
            Ok((execution, positions))
        }
    }
}

async fn build_feed(config: &Config) -> Result<Arc<dyn MarketFeed>> {
    if let Some(path) = config.feed.replay_path.as_deref() {
        let feed = ReplayFeed::open(path)
            .await
            .with_context(|| format!("failed to open replay file {path}"))?;
        return Ok(Arc::new(feed));
    }
    if let Some(url) = config.feed.snapshot_url.as_deref() {
        let feed = HttpSnapshotFeed::new(url, Duration::from_secs(config.broker.timeout_secs))
            .context("failed to create snapshot feed")?;
        return Ok(Arc::new(feed));
    }
    anyhow::bail!("no market feed configured: set feed.snapshot_url or pass --replay")
}

/// Pull remote state before anything is loaded, then start the push worker.
async fn build_sync(config: &Config, shutdown: CancellationToken) -> (Arc<dyn StateSync>, Option<JoinHandle<()>>) {
    if !config.persistence.git_sync_enabled {
        let sync: Arc<dyn StateSync> = Arc::new(NoOpStateSync);
        return (sync, None);
    }

    let settings = GitSyncSettings::from(&config.persistence);
    if let Err(e) = git_sync::pull(&settings).await {
        tracing::warn!(error = %e, "State pull failed; continuing with local state");
    }
    let (sync, handle) = GitStateSync::spawn(settings, shutdown);
    let sync: Arc<dyn StateSync> = Arc::new(sync);
    (sync, Some(handle))
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for Ctrl-C or SIGTERM, then cancel `shutdown`.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. An engine that cannot be
/// stopped cleanly must not start trading.
#[allow(clippy::expect_used)]
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping after the current cycle");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current cycle");
        }
    }

    shutdown.cancel();
}
