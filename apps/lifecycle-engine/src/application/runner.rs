//! Cycle Runner
//!
//! Drives every active strategy controller off one market feed. Each tick
//! reads a frame, fetches broker positions, builds the shared
//! [`MarketSnapshot`](crate::domain::market::MarketSnapshot) and runs the
//! controllers one after another. A controller that panics is logged and
//! counted; the others still run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::context::{ContextError, MarketContextBuilder};
use super::controller::{CycleOutcome, StrategyController};
use super::ports::{FeedError, MarketFeed, PositionSource};
use crate::config::{Config, TradingMode};
use crate::domain::market::{BrokerSnapshot, normalize_row};
use crate::domain::timing;
use crate::observability;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runner errors. None of them stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The feed failed to produce a frame.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The frame could not be turned into a snapshot.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Trading mode.
    pub mode: TradingMode,
    /// Session open (HH:MM).
    pub market_open: String,
    /// Session close (HH:MM).
    pub market_close: String,
    /// Delay between ticks.
    pub poll_interval: Duration,
}

impl From<&Config> for RunnerSettings {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.engine.mode,
            market_open: config.engine.market_open.clone(),
            market_close: config.engine.market_close.clone(),
            poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Controllers ran; one entry per controller that returned.
    Cycled(Vec<(&'static str, CycleOutcome)>),
    /// LIVE session closed; nothing ran.
    OutsideMarketHours(NaiveDateTime),
    /// The feed has no more frames.
    Exhausted,
}

/// Runs all controllers against one feed.
pub struct CycleRunner {
    controllers: Vec<StrategyController>,
    feed: Arc<dyn MarketFeed>,
    positions: Arc<dyn PositionSource>,
    context: MarketContextBuilder,
    settings: RunnerSettings,
    synced: bool,
}

impl CycleRunner {
    /// Create a runner. Controllers should already have loaded their state.
    #[must_use]
    pub fn new(
        controllers: Vec<StrategyController>,
        feed: Arc<dyn MarketFeed>,
        positions: Arc<dyn PositionSource>,
        context: MarketContextBuilder,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            controllers,
            feed,
            positions,
            context,
            settings,
            synced: false,
        }
    }

    /// Controllers in run order.
    #[must_use]
    pub fn controllers(&self) -> &[StrategyController] {
        &self.controllers
    }

    /// Tick until the feed runs dry, `shutdown` fires, or after one tick
    /// when `once` is set.
    pub async fn run(&mut self, shutdown: CancellationToken, once: bool) {
        let mut interval = tokio::time::interval(self.settings.poll_interval.max(MIN_POLL_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            mode = %self.settings.mode,
            strategies = self.controllers.len(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Cycle runner started"
        );

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested; stopping cycle runner");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Exhausted) => {
                            tracing::info!("Market feed exhausted; stopping");
                            break;
                        }
                        Ok(TickOutcome::OutsideMarketHours(now)) => {
                            tracing::debug!(time = %timing::hhmm(now), "Market closed; waiting");
                        }
                        Ok(TickOutcome::Cycled(_)) => {}
                        Err(e) => tracing::warn!(error = %e, "Tick skipped"),
                    }
                    if once {
                        break;
                    }
                }
            }
        }
    }

    /// Run a single tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, RunnerError> {
        let Some(mut frame) = self.feed.next_frame().await? else {
            return Ok(TickOutcome::Exhausted);
        };
        let now = frame.now;

        if self.settings.mode.is_live()
            && !timing::is_market_hours(now, &self.settings.market_open, &self.settings.market_close)
        {
            return Ok(TickOutcome::OutsideMarketHours(now));
        }

        let broker = match frame.positions.take() {
            Some(rows) => BrokerSnapshot::Available(rows.iter().filter_map(normalize_row).collect()),
            None => self.positions.snapshot().await,
        };

        // Startup sync waits for the first tick that actually reports positions.
        if !self.synced && broker.rows().is_some() {
            for controller in &mut self.controllers {
                controller.startup_sync(&broker, now).await;
            }
            self.synced = true;
        }

        let market = self.context.build(frame, broker)?;

        let mut outcomes = Vec::with_capacity(self.controllers.len());
        for controller in &mut self.controllers {
            let name = controller.name();
            match AssertUnwindSafe(controller.run_cycle(&market))
                .catch_unwind()
                .await
            {
                Ok(outcome) => {
                    tracing::debug!(
                        strategy = name,
                        action = ?outcome.action,
                        filled = outcome.filled,
                        failed = outcome.failed,
                        "Cycle complete"
                    );
                    outcomes.push((name, outcome));
                }
                Err(_) => {
                    tracing::error!(strategy = name, "Controller panicked; continuing with the rest");
                    observability::record_controller_failure(name);
                }
            }
        }
        Ok(TickOutcome::Cycled(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::context::ContextSettings;
    use crate::application::controller::test_support::{Harness, at, date, put_ladder};
    use crate::application::controller::{CalendarVariant, ControllerDeps, CycleAction};
    use crate::application::ports::{
        ExecutionError, ExecutionPort, FeedFrame, Fill, NoOpStateSync, OrderRequest,
    };
    use crate::config::{CalendarConfig, StrategyKind};
    use crate::domain::leg::RoleTag;
    use crate::domain::market::RawPositionRow;
    use crate::domain::timing::HolidayCalendar;
    use crate::infrastructure::journal::InMemoryTradeJournal;
    use crate::infrastructure::persistence::InMemoryStatePersistence;

    struct ScriptedFeed {
        frames: Mutex<VecDeque<FeedFrame>>,
    }

    impl ScriptedFeed {
        fn new(frames: Vec<FeedFrame>) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(frames.into()),
            })
        }
    }

    #[async_trait]
    impl MarketFeed for ScriptedFeed {
        async fn next_frame(&self) -> Result<Option<FeedFrame>, FeedError> {
            Ok(self.frames.lock().unwrap().pop_front())
        }
    }

    #[derive(Default)]
    struct CountingPositions {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PositionSource for CountingPositions {
        async fn snapshot(&self) -> BrokerSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BrokerSnapshot::Unavailable
        }
    }

    struct PanickingExecution;

    #[async_trait]
    impl ExecutionPort for PanickingExecution {
        async fn execute(&self, _request: OrderRequest) -> Result<Fill, ExecutionError> {
            panic!("broker adapter bug");
        }
    }

    fn frame(now: NaiveDateTime) -> FeedFrame {
        let mut chain = put_ladder(date(2026, 3, 10), dec!(24000)).entries;
        chain.extend(put_ladder(date(2026, 4, 28), dec!(24000)).entries);
        FeedFrame {
            now,
            spot: dec!(24010),
            chain,
            quotes: HashMap::new(),
            greeks: HashMap::new(),
            positions: None,
        }
    }

    fn runner(
        controllers: Vec<StrategyController>,
        frames: Vec<FeedFrame>,
        positions: Arc<CountingPositions>,
        config: &Config,
    ) -> CycleRunner {
        let calendar = Arc::new(HolidayCalendar::default());
        CycleRunner::new(
            controllers,
            ScriptedFeed::new(frames),
            positions,
            MarketContextBuilder::new(ContextSettings::from(config), calendar),
            RunnerSettings::from(config),
        )
    }

    fn calendar_controller(config: &Config) -> (Harness, StrategyController) {
        Harness::build_with(Box::new(CalendarVariant::new(CalendarConfig::default())), config)
    }

    #[tokio::test]
    async fn test_tick_runs_controllers_and_queries_positions() {
        let config = Config::default();
        let (harness, controller) = calendar_controller(&config);
        let positions = Arc::new(CountingPositions::default());
        let mut runner = runner(vec![controller], vec![frame(at(2026, 3, 4, 15, 20))], positions.clone(), &config);

        let TickOutcome::Cycled(outcomes) = runner.tick().await.unwrap() else {
            panic!("expected a cycle");
        };

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, "calendar");
        assert_eq!(outcomes[0].1.action, CycleAction::Entry);
        assert_eq!(harness.execution.requests().len(), 2);
        assert_eq!(positions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.tick().await.unwrap(), TickOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_frame_positions_replace_broker_query() {
        let config = Config::default();
        let (_harness, controller) = calendar_controller(&config);
        let positions = Arc::new(CountingPositions::default());
        let mut replayed = frame(at(2026, 3, 4, 11, 0));
        replayed.positions = Some(vec![RawPositionRow::default()]);
        let mut runner = runner(vec![controller], vec![replayed], positions.clone(), &config);

        runner.tick().await.unwrap();

        assert_eq!(positions.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_startup_sync_waits_for_available_positions() {
        let config = Config::default();
        let (harness, controller) = calendar_controller(&config);
        let positions = Arc::new(CountingPositions::default());
        let mut reported = frame(at(2026, 3, 4, 11, 1));
        reported.positions = Some(vec![RawPositionRow {
            instrument_key: Some("NSE_FO|NIFTY24000PE".to_string()),
            trading_symbol: Some("NIFTY26MAR24000PE".to_string()),
            net_quantity: -65,
            average_price: Some(dec!(100)),
            strike_price: Some(dec!(24000)),
            ..RawPositionRow::default()
        }]);
        let mut runner = runner(
            vec![controller],
            vec![frame(at(2026, 3, 4, 11, 0)), reported],
            positions.clone(),
            &config,
        );

        runner.tick().await.unwrap();
        assert_eq!(positions.calls.load(Ordering::SeqCst), 1);
        assert!(harness.journal.tags().is_empty());

        runner.tick().await.unwrap();
        assert_eq!(harness.journal.tags(), vec!["SYNC_EXISTING"]);
        assert!(runner.controllers()[0].state().has(RoleTag::WeeklySell));
    }

    #[tokio::test]
    async fn test_unavailable_positions_keep_sync_pending() {
        let config = Config::default();
        let (harness, controller) = calendar_controller(&config);
        let mut runner = runner(
            vec![controller],
            vec![frame(at(2026, 3, 4, 11, 0)), frame(at(2026, 3, 4, 11, 1))],
            Arc::new(CountingPositions::default()),
            &config,
        );

        runner.tick().await.unwrap();
        runner.tick().await.unwrap();

        assert!(!runner.synced);
        assert!(harness.journal.tags().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_controller_does_not_stop_others() {
        let config = Config::default();
        let deps = ControllerDeps {
            execution: Arc::new(PanickingExecution),
            persistence: Arc::new(InMemoryStatePersistence::new()),
            journal: Arc::new(InMemoryTradeJournal::new()),
            sync: Arc::new(NoOpStateSync),
        };
        let broken = StrategyController::from_config(
            StrategyKind::Calendar,
            &config,
            deps,
            Arc::new(HolidayCalendar::default()),
        );
        let (harness, healthy) = calendar_controller(&config);
        let positions = Arc::new(CountingPositions::default());
        let mut runner = runner(vec![broken, healthy], vec![frame(at(2026, 3, 4, 15, 20))], positions, &config);

        let TickOutcome::Cycled(outcomes) = runner.tick().await.unwrap() else {
            panic!("expected a cycle");
        };

        assert_eq!(outcomes.len(), 1);
        assert_eq!(harness.execution.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_live_mode_waits_outside_market_hours() {
        let mut config = Config::default();
        config.engine.mode = TradingMode::Live;
        let (harness, controller) = calendar_controller(&config);
        let positions = Arc::new(CountingPositions::default());
        let mut runner = runner(vec![controller], vec![frame(at(2026, 3, 4, 8, 30))], positions.clone(), &config);

        let outcome = runner.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::OutsideMarketHours(at(2026, 3, 4, 8, 30)));
        assert!(harness.execution.requests().is_empty());
        assert_eq!(positions.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_frame_is_reported_not_fatal() {
        let config = Config::default();
        let (_harness, controller) = calendar_controller(&config);
        let mut thin = frame(at(2026, 3, 4, 11, 0));
        thin.chain.clear();
        let mut runner = runner(
            vec![controller],
            vec![thin],
            Arc::new(CountingPositions::default()),
            &config,
        );

        let err = runner.tick().await.unwrap_err();

        assert!(matches!(err, RunnerError::Context(_)));
    }

    #[tokio::test]
    async fn test_run_stops_when_feed_is_exhausted() {
        let mut config = Config::default();
        config.engine.poll_interval_secs = 0;
        let (harness, controller) = calendar_controller(&config);
        let frames = vec![frame(at(2026, 3, 4, 15, 20)), frame(at(2026, 3, 4, 15, 21))];
        let mut runner = runner(vec![controller], frames, Arc::new(CountingPositions::default()), &config);

        runner.run(CancellationToken::new(), false).await;

        assert_eq!(harness.execution.requests().len(), 2);
        assert_eq!(runner.controllers()[0].state().legs.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_runner_returns_immediately() {
        let config = Config::default();
        let (harness, controller) = calendar_controller(&config);
        let mut runner = runner(
            vec![controller],
            vec![frame(at(2026, 3, 4, 15, 20))],
            Arc::new(CountingPositions::default()),
            &config,
        );
        let token = CancellationToken::new();
        token.cancel();

        runner.run(token, false).await;

        assert!(harness.execution.requests().is_empty());
    }
}
