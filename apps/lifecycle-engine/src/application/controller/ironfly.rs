//! Weekly put butterfly ("iron-fly").
//!
//! Entered on the current weekly expiry day for the following week: long
//! upper wing, two short body lots, long lower wing. The first stop-loss
//! breach is repaired once with a call calendar above the upper wing; a
//! breach after that closes the structure.

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::config::{IronflyConfig, StrategyKind};
use crate::domain::leg::{OptionType, RoleTag, StrategyState};
use crate::domain::market::{BrokerPositionRow, ExpiryChain, OptionChainEntry};
use crate::domain::reconciliation::{ReconciliationReport, reconcile_butterfly};
use crate::domain::risk::OpenPnl;
use crate::domain::selection::{CHAIN_STRIKE_STEP, SelectionError, select_by_strike};

use super::variant::{CycleContext, ExitReason, LegOrder, Plan, StrategyVariant, atm_strike};

const ROLES: &[RoleTag] = &[RoleTag::IfLeg1, RoleTag::IfLeg2, RoleTag::IfLeg3];

/// Iron-fly variant.
#[derive(Debug, Clone)]
pub struct IronflyVariant {
    config: IronflyConfig,
}

impl IronflyVariant {
    /// Create the variant.
    #[must_use]
    pub const fn new(config: IronflyConfig) -> Self {
        Self { config }
    }

    /// Open P&L as a fraction of capital. `None` while a leg is unquoted.
    fn pnl_fraction(&self, open: OpenPnl) -> Option<Decimal> {
        if open.missing_quotes || self.config.capital <= Decimal::ZERO {
            return None;
        }
        Some(open.total / self.config.capital)
    }

    fn stop_loss_hit(&self, open: OpenPnl) -> bool {
        self.pnl_fraction(open)
            .is_some_and(|pct| pct <= -self.config.stop_loss_pct)
    }

    fn is_entry_trigger(&self, ctx: &CycleContext<'_>) -> bool {
        if ctx.timing.override_timing_checks || ctx.market.flags.expiry_skipped {
            return true;
        }
        let is_entry_day = match ctx.market.chains.current_weekly.as_ref() {
            Some(chain) => chain.expiry == ctx.today(),
            None => ctx.market.now.weekday() == self.config.entry_weekday,
        };
        is_entry_day && ctx.at_or_after(&self.config.entry_time)
    }

    /// Body expiry, falling back to the earliest leg expiry.
    fn structure_expiry(state: &StrategyState) -> Option<chrono::NaiveDate> {
        state
            .leg(RoleTag::IfLeg2)
            .and_then(|leg| leg.expiry_date())
            .or_else(|| state.legs.values().filter_map(|leg| leg.expiry_date()).min())
    }
}

impl StrategyVariant for IronflyVariant {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ironfly
    }

    fn required_roles(&self) -> &'static [RoleTag] {
        ROLES
    }

    fn reconcile(
        &self,
        state: &mut StrategyState,
        rows: &[BrokerPositionRow],
        underlying: &str,
    ) -> ReconciliationReport {
        reconcile_butterfly(state, rows, underlying)
    }

    fn exit_signal(&self, ctx: &CycleContext<'_>) -> Option<ExitReason> {
        let body_expires_today = ctx
            .state
            .leg(RoleTag::IfLeg2)
            .and_then(|leg| leg.expiry_date())
            .is_some_and(|expiry| expiry == ctx.today());
        if body_expires_today && ctx.at_or_after(&self.config.exit_time) {
            return Some(ExitReason::ExpiryDay);
        }

        if ctx.timing.auto_exit_before_monthly_expiry
            && ctx.market.flags.is_day_before_monthly_expiry
            && ctx.at_or_after(&ctx.timing.pre_expiry_exit_time)
        {
            return Some(ExitReason::PreExpiry);
        }

        let Some(pct) = self.pnl_fraction(ctx.open_pnl) else {
            tracing::debug!(strategy = "ironfly", "Leg unquoted; P&L checks skipped");
            return None;
        };
        if pct >= self.config.target_pct {
            tracing::info!(strategy = "ironfly", pnl_pct = %pct, "Target reached");
            return Some(ExitReason::Target);
        }
        if pct <= -self.config.stop_loss_pct && ctx.state.is_adjusted {
            tracing::warn!(strategy = "ironfly", pnl_pct = %pct, "Stop loss after repair");
            return Some(ExitReason::StopLoss);
        }
        None
    }

    fn entry(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        if !self.is_entry_trigger(ctx) {
            tracing::debug!(strategy = "ironfly", "Waiting for entry window");
            return Ok(None);
        }

        let chains = &ctx.market.chains;
        let target = if ctx.market.flags.expiry_skipped {
            chains.current_weekly.as_ref()
        } else {
            chains.next_weekly.as_ref()
        };
        let Some(chain) = target else {
            tracing::warn!(strategy = "ironfly", "Target weekly chain unavailable");
            return Ok(None);
        };

        let atm = atm_strike(ctx.market.spot, CHAIN_STRIKE_STEP);
        let [upper, body, lower] = self.config.offsets.map(|offset| atm + offset);
        // Every strike must be listed before anything is traded.
        let contracts = [
            (RoleTag::IfLeg1, select_by_strike(chain, OptionType::Put, upper)?, 1),
            (RoleTag::IfLeg3, select_by_strike(chain, OptionType::Put, lower)?, 1),
            (RoleTag::IfLeg2, select_by_strike(chain, OptionType::Put, body)?, 2),
        ];

        tracing::info!(
            strategy = "ironfly",
            spot = %ctx.market.spot,
            atm = %atm,
            expiry = %chain.expiry,
            upper = %upper,
            body = %body,
            lower = %lower,
            "Building put butterfly"
        );
        let orders: Vec<LegOrder> = contracts
            .into_iter()
            .filter(|(role, _, _)| !ctx.state.has(*role))
            .map(|(role, contract, lots)| LegOrder::new(role, contract, ctx.lot_size * lots))
            .collect();
        if orders.is_empty() {
            return Ok(None);
        }
        Ok(Some(Plan::Open { orders, tag: "ENTRY" }))
    }

    fn adjustment(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        if ctx.state.is_adjusted || !self.stop_loss_hit(ctx.open_pnl) {
            return Ok(None);
        }
        if !ctx.market.flags.can_adjust {
            tracing::info!(strategy = "ironfly", "Stop loss breached; repair waits for the next candle");
            return Ok(None);
        }
        let Some(upper) = ctx.state.leg(RoleTag::IfLeg1) else {
            return Ok(None);
        };
        let Some(expiry) = Self::structure_expiry(ctx.state) else {
            return Ok(None);
        };

        let short_chain = ctx.market.chains.for_expiry(expiry);
        let long_chain = ctx.chain_after(expiry);
        let (Some(short_chain), Some(long_chain)) = (short_chain, long_chain) else {
            tracing::error!(
                strategy = "ironfly",
                expiry = %expiry,
                "Chains for the call calendar unavailable; repair skipped"
            );
            return Ok(None);
        };

        let strike = upper.strike() + self.config.adjustment_inward_offset;
        let quantity = upper.quantity();
        let pick = |chain: &ExpiryChain| -> Result<OptionChainEntry, SelectionError> {
            select_by_strike(chain, OptionType::Call, strike).cloned()
        };
        let long = pick(long_chain)?;
        let short = pick(short_chain)?;

        tracing::warn!(
            strategy = "ironfly",
            strike = %strike,
            short_expiry = %short.expiry_date,
            long_expiry = %long.expiry_date,
            "Stop loss breached; building call calendar"
        );
        Ok(Some(Plan::Open {
            orders: vec![
                LegOrder::new(RoleTag::IfAdjCeLong, &long, quantity),
                LegOrder::new(RoleTag::IfAdjCeShort, &short, quantity),
            ],
            tag: "ADJ_CALL_CALENDAR",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::controller::CycleAction;
    use crate::application::controller::test_support::*;
    use crate::domain::leg::Side;
    use crate::domain::market::{ChainSet, MarketSnapshot};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn variant() -> Box<dyn StrategyVariant> {
        Box::new(IronflyVariant::new(IronflyConfig::default()))
    }

    // 2026-03-10 and 2026-03-17 are Tuesdays.
    fn this_week() -> NaiveDate {
        date(2026, 3, 10)
    }

    fn next_week() -> NaiveDate {
        date(2026, 3, 17)
    }

    fn entry_chains() -> ChainSet {
        ChainSet {
            current_weekly: Some(ladder(this_week(), dec!(24000))),
            next_weekly: Some(ladder(next_week(), dec!(24000))),
            monthly: None,
        }
    }

    /// Chains once the butterfly's own week is the nearest expiry.
    fn live_chains() -> ChainSet {
        ChainSet {
            current_weekly: Some(ladder(next_week(), dec!(24000))),
            next_weekly: Some(ladder(date(2026, 3, 24), dec!(24000))),
            monthly: None,
        }
    }

    fn held(state: &mut StrategyState) {
        for (role, strike, side, lots) in [
            (RoleTag::IfLeg1, dec!(23950), Side::Buy, 1),
            (RoleTag::IfLeg2, dec!(23750), Side::Sell, 2),
            (RoleTag::IfLeg3, dec!(23550), Side::Buy, 1),
        ] {
            let key = key(next_week(), OptionType::Put, strike);
            state.put(leg_with_qty(role, &key, strike, side, next_week(), LOT * lots));
        }
    }

    /// Quote every leg at entry except the body, which is marked at `body`.
    fn quoted(now: chrono::NaiveDateTime, state: &StrategyState, body: Decimal) -> MarketSnapshot {
        let mut snapshot = market(now, dec!(24000), live_chains());
        quote_state(&mut snapshot, state);
        let body_key = key(next_week(), OptionType::Put, dec!(23750));
        snapshot.quotes.insert(body_key, body);
        snapshot
    }

    #[tokio::test]
    async fn test_entry_on_weekly_expiry_targets_next_week() {
        let (harness, mut controller) = Harness::build(variant());
        let snapshot = market(at(2026, 3, 10, 12, 0), dec!(24010), entry_chains());

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Entry);
        assert_eq!(outcome.filled, 3);
        let orders = harness.execution.requests();
        let placed: Vec<(String, Side, u32)> = orders
            .iter()
            .map(|o| (o.instrument_key.clone(), o.side, o.quantity))
            .collect();
        assert_eq!(
            placed,
            vec![
                ("NSE_FO|0317P23950".to_string(), Side::Buy, LOT),
                ("NSE_FO|0317P23550".to_string(), Side::Buy, LOT),
                ("NSE_FO|0317P23750".to_string(), Side::Sell, LOT * 2),
            ]
        );
        assert_eq!(controller.status(), crate::domain::leg::LedgerStatus::Active);
    }

    #[tokio::test]
    async fn test_entry_waits_for_entry_time() {
        let (harness, mut controller) = Harness::build(variant());
        let snapshot = market(at(2026, 3, 10, 11, 59), dec!(24010), entry_chains());

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_expiry_enters_on_current_chain() {
        let (harness, mut controller) = Harness::build(variant());
        let mut snapshot = market(at(2026, 3, 11, 9, 30), dec!(24010), live_chains());
        snapshot.flags.expiry_skipped = true;

        controller.run_cycle(&snapshot).await;

        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 3);
        assert!(orders.iter().all(|o| o.expiry == Some(next_week())));
    }

    #[tokio::test]
    async fn test_unlisted_strike_aborts_whole_entry() {
        let (harness, mut controller) = Harness::build(variant());
        // Upper wing at 25350 is beyond the listed ladder.
        let snapshot = market(at(2026, 3, 10, 12, 0), dec!(25400), entry_chains());

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
        assert!(controller.state().is_empty());
    }

    #[tokio::test]
    async fn test_target_closes_shorts_first() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        // Body bought back 60 cheaper on two lots: 7800 >= 3% of 180000.
        let snapshot = quoted(at(2026, 3, 11, 11, 0), controller.state(), dec!(40));

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Exit(ExitReason::Target));
        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].instrument_key, "NSE_FO|0317P23750");
        assert_eq!(orders[0].side, Side::Buy);
        assert!(controller.state().is_empty());
    }

    #[tokio::test]
    async fn test_first_breach_builds_call_calendar() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        // Loss of 1950 breaches the 1% stop on 180000.
        let mut snapshot = quoted(at(2026, 3, 11, 11, 0), controller.state(), dec!(115));
        snapshot.flags.can_adjust = true;

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Adjustment);
        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].instrument_key, "NSE_FO|0324C24050");
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[1].instrument_key, "NSE_FO|0317C24050");
        assert_eq!(orders[1].side, Side::Sell);
        assert!(controller.state().is_adjusted);
        assert_eq!(controller.state().adjustment_count, 1);
    }

    #[tokio::test]
    async fn test_breach_off_candle_waits() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        let snapshot = quoted(at(2026, 3, 11, 11, 1), controller.state(), dec!(115));

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_breach_exits() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        controller.state_mut().is_adjusted = true;
        let mut snapshot = quoted(at(2026, 3, 11, 11, 0), controller.state(), dec!(115));
        snapshot.flags.can_adjust = true;

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Exit(ExitReason::StopLoss));
        assert_eq!(harness.execution.requests().len(), 3);
        assert!(controller.state().is_empty());
        assert!(!controller.state().is_adjusted);
    }

    #[tokio::test]
    async fn test_expiry_day_exit_at_exit_time() {
        let (_harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        let snapshot = quoted(at(2026, 3, 17, 15, 0), controller.state(), dec!(100));

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Exit(ExitReason::ExpiryDay));
    }

    #[tokio::test]
    async fn test_unquoted_leg_skips_pnl_checks() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut());
        let mut snapshot = quoted(at(2026, 3, 11, 11, 0), controller.state(), dec!(40));
        snapshot
            .quotes
            .remove(&key(next_week(), OptionType::Put, dec!(23550)));
        // Chain prices would otherwise stand in for the missing quote.
        snapshot.chains = ChainSet::default();

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
    }
}
