//! Strategy Controller
//!
//! Runs the lifecycle of one strategy instance. Every cycle first brings the
//! ledger up to date (reconciliation, expiry recovery, expired-leg cleanup,
//! delta refresh) and then walks the stages in priority order. The first
//! stage that produces a plan claims the cycle:
//!
//! 1. forced exit (max loss, opening-gap emergency, variant exits)
//! 2. rollover
//! 3. entry
//! 4. adjustment
//!
//! State is written before the cycle returns whenever anything changed.

mod batman;
mod calendar;
mod ironfly;
mod orders;
mod summary;
mod variant;

use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub use batman::BatmanVariant;
pub use calendar::CalendarVariant;
pub use ironfly::IronflyVariant;
pub use summary::PnlSummary;
pub use variant::{
    CycleContext, ExitReason, LegOrder, LegRoll, Plan, RollSequence, StrategyVariant, atm_strike,
    combined_delta,
};

use crate::application::ports::{
    ExecutionError, ExecutionPort, PersistenceError, StatePersistence, StateSync, TradeJournal,
};
use crate::config::{Config, StrategyKind, TimingConfig, TradingMode};
use crate::domain::leg::{LedgerStatus, LegError, StrategyState};
use crate::domain::market::{BrokerSnapshot, MarketSnapshot};
use crate::domain::pricing::{DEFAULT_TIME_TO_EXPIRY, DEFAULT_VOLATILITY, bs_delta};
use crate::domain::risk::{GapDecision, OpenPnl, RiskPolicy};
use crate::domain::timing::{self, HolidayCalendar};
use crate::observability;

/// Controller errors.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// An order failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A filled order could not be turned into a ledger leg.
    #[error("Filled order could not be tracked: {0}")]
    Leg(#[from] LegError),

    /// Saved state could not be read.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Saved state is not a valid ledger.
    #[error("Saved state is unreadable: {0}")]
    StateDecode(#[from] serde_json::Error),
}

/// Ports a controller talks to.
#[derive(Clone)]
pub struct ControllerDeps {
    /// Order execution.
    pub execution: Arc<dyn ExecutionPort>,
    /// Ledger storage.
    pub persistence: Arc<dyn StatePersistence>,
    /// Trade journal for this strategy.
    pub journal: Arc<dyn TradeJournal>,
    /// Remote replication of saved state.
    pub sync: Arc<dyn StateSync>,
}

/// Engine settings a controller needs.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Trading mode.
    pub mode: TradingMode,
    /// Underlying used to filter broker rows.
    pub underlying: String,
    /// Exchange lot size.
    pub lot_size: u32,
    /// Prefix for broker order tags.
    pub order_tag_prefix: String,
    /// Market open (HH:MM), start of the gap window.
    pub market_open: String,
    /// Offset added to the printed P&L.
    pub manual_pnl_offset: Decimal,
    /// Risk-free rate for the delta fallback.
    pub risk_free_rate: f64,
    /// Gap protection switch.
    pub gap_protection_enabled: bool,
    /// Gap window length after the open.
    pub gap_window_minutes: u32,
    /// Seconds to wait after a failed entry.
    pub entry_cooldown_secs: i64,
    /// Timing gates.
    pub timing: TimingConfig,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.engine.mode,
            underlying: config.engine.underlying.clone(),
            lot_size: config.engine.lot_size,
            order_tag_prefix: config.engine.order_tag_prefix.clone(),
            market_open: config.engine.market_open.clone(),
            manual_pnl_offset: config.engine.manual_pnl_offset,
            risk_free_rate: config.engine.risk_free_rate,
            gap_protection_enabled: config.risk.gap_protection_enabled,
            gap_window_minutes: config.risk.gap_window_minutes,
            entry_cooldown_secs: config.risk.entry_cooldown_secs,
            timing: config.timing.clone(),
        }
    }
}

/// What a cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// No stage produced a plan.
    Idle,
    /// The structure was (or was attempted to be) closed.
    Exit(ExitReason),
    /// An expiring leg was rolled.
    Rollover,
    /// Missing legs were opened.
    Entry,
    /// The live structure was adjusted.
    Adjustment,
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Stage that claimed the cycle.
    pub action: CycleAction,
    /// Orders filled.
    pub filled: usize,
    /// Orders that failed.
    pub failed: usize,
    /// Whether the ledger changed (and was saved).
    pub state_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ForcedExit,
    Rollover,
    Entry,
    Adjustment,
}

/// Lifecycle controller for one strategy instance.
pub struct StrategyController {
    variant: Box<dyn StrategyVariant>,
    deps: ControllerDeps,
    settings: ControllerSettings,
    risk: RiskPolicy,
    calendar: Arc<HolidayCalendar>,
    state: StrategyState,
}

impl StrategyController {
    /// Create a controller with an empty ledger.
    #[must_use]
    pub fn new(
        variant: Box<dyn StrategyVariant>,
        deps: ControllerDeps,
        settings: ControllerSettings,
        risk: RiskPolicy,
        calendar: Arc<HolidayCalendar>,
    ) -> Self {
        Self {
            variant,
            deps,
            settings,
            risk,
            calendar,
            state: StrategyState::new(),
        }
    }

    /// Build the controller for `kind` from the loaded configuration.
    #[must_use]
    pub fn from_config(
        kind: StrategyKind,
        config: &Config,
        deps: ControllerDeps,
        calendar: Arc<HolidayCalendar>,
    ) -> Self {
        let variant: Box<dyn StrategyVariant> = match kind {
            StrategyKind::Calendar => Box::new(CalendarVariant::new(config.calendar.clone())),
            StrategyKind::Ironfly => Box::new(IronflyVariant::new(config.ironfly.clone())),
            StrategyKind::Batman => Box::new(BatmanVariant::new(config.batman.clone())),
        };
        let risk = RiskPolicy::new((&config.risk).into());
        Self::new(variant, deps, ControllerSettings::from(config), risk, calendar)
    }

    /// Strategy name used for files, journals and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.variant.kind().name()
    }

    /// Strategy kind.
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.variant.kind()
    }

    /// Current ledger.
    #[must_use]
    pub const fn state(&self) -> &StrategyState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) const fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    /// Ledger status against the variant's required roles.
    #[must_use]
    pub fn status(&self) -> LedgerStatus {
        self.state.status(self.variant.required_roles())
    }

    /// Load the saved ledger for this strategy and mode.
    pub async fn load_state(&mut self) -> Result<LedgerStatus, ControllerError> {
        let name = self.name();
        match self
            .deps
            .persistence
            .load(name, self.settings.mode.as_str())
            .await?
        {
            Some(value) => {
                self.state = serde_json::from_value(value)?;
                tracing::info!(
                    strategy = name,
                    legs = self.state.legs.len(),
                    adjustments = self.state.adjustment_count,
                    "Loaded saved state"
                );
            }
            None => tracing::info!(strategy = name, "No saved state; starting empty"),
        }
        Ok(self.status())
    }

    /// Startup reconciliation. Unlike the per-cycle pass, every leg held
    /// afterwards is journaled once per day as `SYNC_EXISTING`.
    pub async fn startup_sync(&mut self, broker: &BrokerSnapshot, now: NaiveDateTime) {
        let name = self.name();
        let Some(rows) = broker.rows() else {
            tracing::warn!(strategy = name, "Broker positions unavailable; keeping saved state");
            return;
        };

        let report = self
            .variant
            .reconcile(&mut self.state, rows, &self.settings.underlying);
        if report.changed() {
            report.emit(name);
            observability::record_reconciliation_changes(name, report.changes.len());
            self.state.close_structure();
        }

        for leg in self.state.legs.values() {
            let record = orders::trade_record(now, leg, leg.side(), leg.entry_price(), "SYNC_EXISTING", None);
            if let Err(e) = self.deps.journal.record(record, true).await {
                tracing::warn!(strategy = name, error = %e, "Failed to journal synced leg");
            }
        }

        tracing::info!(
            strategy = name,
            legs = self.state.legs.len(),
            status = ?self.status(),
            "Startup sync complete"
        );
        if report.changed() {
            self.persist().await;
        }
    }

    /// Run one lifecycle cycle against `market`.
    pub async fn run_cycle(&mut self, market: &MarketSnapshot) -> CycleOutcome {
        let before = self.state.clone();
        self.prepare(market);
        let prepared = self.state != before;
        // Deltas move every tick; only structural changes are worth a save.
        self.refresh_deltas(market);
        let refreshed = self.state.clone();

        let open_pnl = RiskPolicy::open_pnl(&self.state, market);
        let mut outcome = match self.plan(market, open_pnl) {
            Some((stage, plan)) => self.execute(stage, plan, market).await,
            None => CycleOutcome {
                action: CycleAction::Idle,
                filled: 0,
                failed: 0,
                state_changed: false,
            },
        };

        outcome.state_changed = prepared || self.state != refreshed;
        if outcome.state_changed {
            self.persist().await;
        }

        let summary = self.pnl_summary(market).await;
        summary.log(self.name(), market.flags.can_adjust);
        outcome
    }

    fn prepare(&mut self, market: &MarketSnapshot) {
        let name = self.name();

        if let Some(rows) = market.broker.rows() {
            let report = self
                .variant
                .reconcile(&mut self.state, rows, &self.settings.underlying);
            if report.changed() {
                report.emit(name);
                observability::record_reconciliation_changes(name, report.changes.len());
                self.state.close_structure();
            }
        }

        for leg in self.state.legs.values_mut() {
            if leg.expiry_date().is_none()
                && let Some(entry) = market.chains.find_key(leg.instrument_key())
            {
                leg.set_expiry(entry.expiry_date);
                tracing::info!(
                    strategy = name,
                    role = %leg.role(),
                    expiry = %entry.expiry_date,
                    "Recovered leg expiry from chain"
                );
            }
        }

        for leg in self.state.purge_expired(market.today()) {
            tracing::info!(
                strategy = name,
                role = %leg.role(),
                instrument_key = leg.instrument_key(),
                expiry = ?leg.expiry_date(),
                "Expired leg removed"
            );
        }
    }

    fn refresh_deltas(&mut self, market: &MarketSnapshot) {
        let name = self.name();
        let rate = self.settings.risk_free_rate;
        let Some(spot) = market.spot.to_f64() else {
            return;
        };

        for leg in self.state.legs.values_mut() {
            let key = leg.instrument_key();
            let contract = market.chains.find_key(key);
            let greeks = market.greeks.get(key);

            let reported = greeks
                .and_then(|g| g.delta)
                .or_else(|| contract.and_then(|c| c.delta))
                .filter(|d| d.is_finite());

            let delta = match reported {
                Some(delta) => delta.abs(),
                None => {
                    let Some(strike) = leg.strike().to_f64().filter(|k| *k > 0.0) else {
                        continue;
                    };
                    let sigma = greeks
                        .and_then(|g| g.iv)
                        .or_else(|| contract.map(|c| c.iv))
                        .filter(|v| *v > 0.0)
                        .unwrap_or(DEFAULT_VOLATILITY);
                    let t = contract
                        .and_then(|c| c.time_to_expiry)
                        .or_else(|| {
                            leg.expiry_date()
                                .and_then(|d| market.chains.for_expiry(d))
                                .and_then(|chain| chain.entries.first())
                                .and_then(|c| c.time_to_expiry)
                        })
                        .unwrap_or(DEFAULT_TIME_TO_EXPIRY);
                    bs_delta(leg.option_type(), spot, strike, t, rate, sigma).abs()
                }
            };

            leg.set_delta(delta);
            tracing::debug!(strategy = name, role = %leg.role(), delta, "Delta refreshed");
        }
    }

    fn context<'a>(&'a self, market: &'a MarketSnapshot, open_pnl: OpenPnl) -> CycleContext<'a> {
        CycleContext {
            market,
            state: &self.state,
            calendar: &self.calendar,
            risk: &self.risk,
            timing: &self.settings.timing,
            mode: self.settings.mode,
            lot_size: self.settings.lot_size,
            open_pnl,
            in_gap_window: self.settings.gap_protection_enabled
                && timing::is_gap_window(
                    market.now,
                    &self.settings.market_open,
                    self.settings.gap_window_minutes,
                ),
        }
    }

    fn plan(&self, market: &MarketSnapshot, open_pnl: OpenPnl) -> Option<(Stage, Plan)> {
        let name = self.name();
        let ctx = self.context(market, open_pnl);

        if let Some(reason) = self.forced_exit(&ctx) {
            return Some((Stage::ForcedExit, Plan::Exit(reason)));
        }

        if !self.state.is_empty() {
            match self.variant.rollover(&ctx) {
                Ok(Some(plan)) => return Some((Stage::Rollover, plan)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(strategy = name, error = %e, "Rollover skipped: no replacement contract");
                    return None;
                }
            }
        }

        if self.status() != LedgerStatus::Active {
            if self
                .state
                .in_entry_cooldown(market.now, self.settings.entry_cooldown_secs)
            {
                tracing::debug!(strategy = name, "Entry cooling down after a failed attempt");
            } else {
                match self.variant.entry(&ctx) {
                    Ok(Some(plan)) => return Some((Stage::Entry, plan)),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(strategy = name, error = %e, "Entry skipped: strike selection failed");
                        return None;
                    }
                }
            }
        }

        if self.state.is_empty() {
            return None;
        }
        match self.variant.adjustment(&ctx) {
            Ok(plan) => plan.map(|plan| (Stage::Adjustment, plan)),
            Err(e) => {
                tracing::warn!(strategy = name, error = %e, "Adjustment skipped: strike selection failed");
                None
            }
        }
    }

    fn forced_exit(&self, ctx: &CycleContext<'_>) -> Option<ExitReason> {
        if self.state.is_empty() {
            return None;
        }
        let name = self.name();

        if ctx
            .risk
            .max_loss_breached(ctx.open_pnl, self.state.realized_pnl)
        {
            tracing::error!(
                strategy = name,
                open_pnl = %ctx.open_pnl.total,
                realized_pnl = %self.state.realized_pnl,
                max_loss = %ctx.risk.limits().max_loss,
                "Max loss breached; exiting all legs"
            );
            return Some(ExitReason::MaxLoss);
        }

        if ctx.in_gap_window
            && ctx.risk.evaluate_gap(ctx.open_pnl, ctx.market.spot, None) == GapDecision::EmergencyExit
        {
            tracing::error!(
                strategy = name,
                open_pnl = %ctx.open_pnl.total,
                spot = %ctx.market.spot,
                "Opening gap loss near the limit; exiting all legs"
            );
            return Some(ExitReason::GapEmergency);
        }

        self.variant.exit_signal(ctx)
    }

    async fn execute(&mut self, stage: Stage, plan: Plan, market: &MarketSnapshot) -> CycleOutcome {
        let name = self.name();
        let mut tally = orders::Tally::default();

        let action = match plan {
            Plan::Exit(reason) => {
                self.exit_all(reason, market, &mut tally).await;
                CycleAction::Exit(reason)
            }
            Plan::Roll { rolls, tag } => {
                for roll in &rolls {
                    if !self.execute_roll(roll, tag, market, &mut tally).await {
                        break;
                    }
                }
                if tally.filled > 0 {
                    match stage {
                        Stage::Rollover => self.state.last_rollover_date = Some(market.today()),
                        Stage::Adjustment => self.mark_adjusted(),
                        Stage::ForcedExit | Stage::Entry => {}
                    }
                }
                stage_action(stage)
            }
            Plan::Open { orders, tag } => {
                for order in &orders {
                    match self.open_leg(order, tag, market).await {
                        Ok(_) => tally.filled += 1,
                        Err(e) => {
                            tally.failed += 1;
                            tracing::warn!(
                                strategy = name,
                                role = %order.role,
                                error = %e,
                                "Order failed; remaining legs not placed"
                            );
                            if stage == Stage::Entry {
                                self.state.last_failed_entry = Some(market.now);
                            }
                            break;
                        }
                    }
                }
                if stage == Stage::Adjustment && tally.filled > 0 {
                    self.mark_adjusted();
                }
                stage_action(stage)
            }
        };

        CycleOutcome {
            action,
            filled: tally.filled,
            failed: tally.failed,
            state_changed: false,
        }
    }

    fn mark_adjusted(&mut self) {
        self.state.adjustment_count += 1;
        self.state.is_adjusted = true;
        tracing::info!(
            strategy = self.name(),
            adjustments = self.state.adjustment_count,
            "Adjustment recorded"
        );
    }

    async fn persist(&self) {
        let name = self.name();
        let value = match serde_json::to_value(&self.state) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(strategy = name, error = %e, "Failed to encode state");
                observability::record_state_write_failure(name);
                return;
            }
        };

        match self
            .deps
            .persistence
            .save(name, self.settings.mode.as_str(), &value)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.deps.sync.request_sync(name) {
                    tracing::warn!(strategy = name, error = %e, "State sync request dropped");
                }
            }
            Err(e) => {
                tracing::error!(strategy = name, error = %e, "Failed to save state");
                observability::record_state_write_failure(name);
            }
        }
    }
}

const fn stage_action(stage: Stage) -> CycleAction {
    match stage {
        Stage::Rollover => CycleAction::Rollover,
        Stage::Entry => CycleAction::Entry,
        Stage::ForcedExit | Stage::Adjustment => CycleAction::Adjustment,
    }
}

#[cfg(test)]
pub(crate) mod test_support;
