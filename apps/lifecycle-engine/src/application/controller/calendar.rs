//! Calendar: a weekly short put hedged by a monthly long put.
//!
//! Each leg has its own delta triggers. The weekly short rolls close-first,
//! the monthly hedge rolls open-first. Inside the opening gap window a large
//! move rolls the weekly leg regardless of its delta.

use crate::config::{CalendarConfig, StrategyKind};
use crate::domain::leg::{OptionType, RoleTag, StrategyState};
use crate::domain::market::{BrokerPositionRow, ExpiryChain};
use crate::domain::reconciliation::{ReconciliationReport, reconcile_calendar};
use crate::domain::risk::{DeltaTrigger, GapDecision};
use crate::domain::selection::{DeltaTarget, SelectionError, select_by_delta};

use super::variant::{CycleContext, ExitReason, LegOrder, LegRoll, Plan, RollSequence, StrategyVariant};

const ROLES: &[RoleTag] = &[RoleTag::MonthlyBuy, RoleTag::WeeklySell];

/// Calendar variant.
#[derive(Debug, Clone)]
pub struct CalendarVariant {
    config: CalendarConfig,
}

impl CalendarVariant {
    /// Create the variant.
    #[must_use]
    pub const fn new(config: CalendarConfig) -> Self {
        Self { config }
    }

    fn monthly_target(&self, trigger: Option<DeltaTrigger>) -> DeltaTarget {
        match trigger {
            None if self.config.monthly_force_atm => DeltaTarget::atm(),
            None => DeltaTarget::round(self.config.monthly_entry_delta),
            Some(DeltaTrigger::Fall) if self.config.monthly_force_atm => DeltaTarget::atm(),
            Some(trigger) => DeltaTarget::round(self.config.monthly.target(trigger)),
        }
    }

    fn weekly_order(
        &self,
        ctx: &CycleContext<'_>,
        chain: &ExpiryChain,
        delta: f64,
    ) -> Result<LegOrder, SelectionError> {
        let contract = select_by_delta(chain, OptionType::Put, ctx.market.spot, DeltaTarget::delta(delta))?;
        Ok(LegOrder::new(RoleTag::WeeklySell, contract, ctx.lot_size))
    }

    fn weekly_roll(
        &self,
        ctx: &CycleContext<'_>,
        chain: &ExpiryChain,
        delta: f64,
        tag: &'static str,
    ) -> Result<Option<Plan>, SelectionError> {
        let replacement = self.weekly_order(ctx, chain, delta)?;
        Ok(Some(Plan::Roll {
            rolls: vec![LegRoll {
                replacement,
                sequence: RollSequence::CloseFirst,
            }],
            tag,
        }))
    }

    fn gap_roll(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        let Some(weekly) = ctx.state.leg(RoleTag::WeeklySell) else {
            return Ok(None);
        };
        let GapDecision::ForcedRoll { gap_pct } =
            ctx.risk
                .evaluate_gap(ctx.open_pnl, ctx.market.spot, weekly.entry_spot())
        else {
            return Ok(None);
        };
        let Some(chain) = ctx.market.chains.current_weekly.as_ref() else {
            return Ok(None);
        };
        tracing::warn!(
            strategy = "calendar",
            gap_pct,
            spot = %ctx.market.spot,
            entry_spot = ?weekly.entry_spot(),
            "Opening gap; forcing weekly roll"
        );
        self.weekly_roll(ctx, chain, self.config.weekly.target_fall, "GAP_ROLL_WEEKLY")
    }
}

impl StrategyVariant for CalendarVariant {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Calendar
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
        reconcile_calendar(state, rows, underlying)
    }

    fn exit_signal(&self, ctx: &CycleContext<'_>) -> Option<ExitReason> {
        if !ctx.timing.auto_exit_before_monthly_expiry
            || !ctx.market.flags.is_day_before_monthly_expiry
            || !ctx.at_or_after(&ctx.timing.pre_expiry_exit_time)
        {
            return None;
        }
        // Once the weekly leg has been rolled past the monthly expiry the
        // structure is no longer exposed to it.
        let monthly_expiry = ctx.next_trading_day();
        let exposed = ctx
            .state
            .leg(RoleTag::WeeklySell)
            .is_none_or(|weekly| weekly.expiry_date().is_none_or(|expiry| expiry <= monthly_expiry));
        if exposed {
            Some(ExitReason::PreExpiry)
        } else {
            tracing::info!(
                strategy = "calendar",
                monthly_expiry = %monthly_expiry,
                "Weekly leg expires after the monthly expiry; pre-expiry exit skipped"
            );
            None
        }
    }

    fn rollover(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        if !ctx.timing.rollover_on_t1_enabled
            || ctx.state.last_rollover_date == Some(ctx.today())
            || !ctx.at_or_after(&ctx.timing.early_rollover_time)
        {
            return Ok(None);
        }
        let Some(expiry) = ctx
            .state
            .leg(RoleTag::WeeklySell)
            .and_then(|weekly| weekly.expiry_date())
        else {
            return Ok(None);
        };
        if expiry != ctx.next_trading_day() {
            return Ok(None);
        }
        let Some(chain) = ctx.chain_after(expiry) else {
            tracing::warn!(strategy = "calendar", expiry = %expiry, "No later weekly chain for rollover");
            return Ok(None);
        };
        tracing::info!(
            strategy = "calendar",
            expiry = %expiry,
            next_expiry = %chain.expiry,
            "Weekly leg expires next session; rolling out"
        );
        self.weekly_roll(ctx, chain, self.config.weekly_entry_delta, "ROLLOVER_T1")
    }

    fn entry(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        let has_monthly = ctx.state.has(RoleTag::MonthlyBuy);
        let has_weekly = ctx.state.has(RoleTag::WeeklySell);

        // A live hedge without its short means the weekly leg was closed on
        // its own; put it back without waiting for a new cycle window.
        if has_monthly && !has_weekly {
            let Some(chain) = ctx.market.chains.current_weekly.as_ref() else {
                return Ok(None);
            };
            tracing::info!(strategy = "calendar", "Re-entering weekly leg");
            let order = self.weekly_order(ctx, chain, self.config.weekly_entry_delta)?;
            return Ok(Some(Plan::Open {
                orders: vec![order],
                tag: "REENTRY_WEEKLY",
            }));
        }

        if !ctx.market.flags.can_enter_new_cycle {
            tracing::debug!(strategy = "calendar", "Waiting for entry window");
            return Ok(None);
        }

        let (Some(weekly_chain), Some(monthly_chain)) = (
            ctx.market.chains.current_weekly.as_ref(),
            ctx.market.chains.monthly.as_ref(),
        ) else {
            tracing::warn!(strategy = "calendar", "Entry needs both weekly and monthly chains");
            return Ok(None);
        };

        let mut orders = Vec::with_capacity(2);
        if !has_monthly {
            let contract = select_by_delta(
                monthly_chain,
                OptionType::Put,
                ctx.market.spot,
                self.monthly_target(None),
            )?;
            orders.push(LegOrder::new(RoleTag::MonthlyBuy, contract, ctx.lot_size));
        }
        if !has_weekly {
            orders.push(self.weekly_order(ctx, weekly_chain, self.config.weekly_entry_delta)?);
        }
        Ok(Some(Plan::Open {
            orders,
            tag: "ENTRY",
        }))
    }

    fn adjustment(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        if ctx.in_gap_window
            && let Some(plan) = self.gap_roll(ctx)?
        {
            return Ok(Some(plan));
        }
        if !ctx.market.flags.can_adjust && !ctx.in_gap_window {
            return Ok(None);
        }

        if let Some(weekly) = ctx.state.leg(RoleTag::WeeklySell)
            && let Some(trigger) = self.config.weekly.evaluate(weekly.current_delta())
        {
            if ctx.risk.integrity_suspect(weekly, ctx.market.spot) {
                tracing::warn!(
                    strategy = "calendar",
                    delta = weekly.current_delta(),
                    strike = %weekly.strike(),
                    spot = %ctx.market.spot,
                    "Weekly delta implausible for an in-the-money put; adjustment skipped"
                );
            } else if let Some(chain) = ctx.market.chains.current_weekly.as_ref() {
                tracing::info!(
                    strategy = "calendar",
                    delta = weekly.current_delta(),
                    trigger = ?trigger,
                    "Weekly delta trigger"
                );
                let tag = match trigger {
                    DeltaTrigger::Fall => "ADJ_WEEKLY_FALL",
                    DeltaTrigger::Rise => "ADJ_WEEKLY_RISE",
                };
                return self.weekly_roll(ctx, chain, self.config.weekly.target(trigger), tag);
            }
        }

        if let Some(monthly) = ctx.state.leg(RoleTag::MonthlyBuy)
            && let Some(trigger) = self.config.monthly.evaluate(monthly.current_delta())
            && let Some(chain) = ctx.market.chains.monthly.as_ref()
        {
            if ctx.risk.integrity_suspect(monthly, ctx.market.spot) {
                tracing::warn!(
                    strategy = "calendar",
                    delta = monthly.current_delta(),
                    strike = %monthly.strike(),
                    spot = %ctx.market.spot,
                    "Monthly delta implausible for an in-the-money put; adjustment skipped"
                );
                return Ok(None);
            }
            tracing::info!(
                strategy = "calendar",
                delta = monthly.current_delta(),
                trigger = ?trigger,
                "Monthly delta trigger"
            );
            let contract = select_by_delta(
                chain,
                OptionType::Put,
                ctx.market.spot,
                self.monthly_target(Some(trigger)),
            )?;
            let tag = match trigger {
                DeltaTrigger::Fall => "ADJ_MONTHLY_FALL",
                DeltaTrigger::Rise => "ADJ_MONTHLY_RISE",
            };
            return Ok(Some(Plan::Roll {
                rolls: vec![LegRoll {
                    replacement: LegOrder::new(RoleTag::MonthlyBuy, contract, monthly.quantity()),
                    sequence: RollSequence::OpenFirst,
                }],
                tag,
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::controller::CycleAction;
    use crate::application::controller::test_support::*;
    use crate::domain::leg::Side;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn variant() -> Box<dyn StrategyVariant> {
        Box::new(CalendarVariant::new(CalendarConfig::default()))
    }

    fn weekly_expiry() -> NaiveDate {
        date(2026, 3, 10)
    }

    fn next_weekly_expiry() -> NaiveDate {
        date(2026, 3, 17)
    }

    fn monthly_expiry() -> NaiveDate {
        date(2026, 4, 28)
    }

    fn chains() -> crate::domain::market::ChainSet {
        crate::domain::market::ChainSet {
            current_weekly: Some(put_ladder(weekly_expiry(), dec!(24000))),
            next_weekly: Some(put_ladder(next_weekly_expiry(), dec!(24000))),
            monthly: Some(put_ladder(monthly_expiry(), dec!(24000))),
        }
    }

    fn held(controller_state: &mut StrategyState, weekly_delta: f64, monthly_delta: f64) {
        let mut weekly = leg(RoleTag::WeeklySell, "NSE_FO|W23800", dec!(23800), Side::Sell, weekly_expiry());
        weekly.set_delta(weekly_delta);
        let mut monthly = leg(RoleTag::MonthlyBuy, "NSE_FO|M24000", dec!(24000), Side::Buy, monthly_expiry());
        monthly.set_delta(monthly_delta);
        controller_state.put(weekly);
        controller_state.put(monthly);
    }

    #[tokio::test]
    async fn test_entry_buys_hedge_before_selling_weekly() {
        let (harness, mut controller) = Harness::build(variant());
        let mut snapshot = market(at(2026, 3, 4, 15, 20), dec!(24010), chains());
        snapshot.flags.can_enter_new_cycle = true;

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Entry);
        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].expiry, Some(monthly_expiry()));
        // Forced ATM on the round-100 strike nearest to spot.
        assert!(orders[0].instrument_key.ends_with("24000"));
        assert_eq!(orders[1].side, Side::Sell);
        assert_eq!(orders[1].expiry, Some(weekly_expiry()));
        assert_eq!(controller.status(), crate::domain::leg::LedgerStatus::Active);
        assert!(harness.persistence.save_count() >= 1);
    }

    #[tokio::test]
    async fn test_entry_waits_for_window() {
        let (harness, mut controller) = Harness::build(variant());
        let snapshot = market(at(2026, 3, 4, 11, 0), dec!(24010), chains());

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failed_hedge_sets_cooldown_and_skips_weekly() {
        let (harness, mut controller) = Harness::build(variant());
        harness.execution.fail_side(Side::Buy);
        let mut snapshot = market(at(2026, 3, 4, 15, 20), dec!(24010), chains());
        snapshot.flags.can_enter_new_cycle = true;

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.filled, 0);
        assert!(controller.state().is_empty());
        assert_eq!(controller.state().last_failed_entry, Some(snapshot.now));

        // Within the cooldown nothing is retried.
        harness.execution.clear();
        snapshot.now = at(2026, 3, 4, 15, 22);
        controller.run_cycle(&snapshot).await;
        assert!(harness.execution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_weekly_fall_trigger_rolls_once_to_fall_target() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.81, 0.5);
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(23700), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.81, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Adjustment);
        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 2, "one exit and one entry");
        assert_eq!(orders[0].instrument_key, "NSE_FO|W23800");
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[1].side, Side::Sell);
        let weekly = controller.state().leg(RoleTag::WeeklySell).unwrap();
        assert!((weekly.current_delta() - 0.50).abs() < 0.03);
    }

    #[tokio::test]
    async fn test_weekly_rise_trigger_uses_rise_target() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.09, 0.5);
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(24300), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.09, 0.5);

        controller.run_cycle(&snapshot).await;

        let weekly = controller.state().leg(RoleTag::WeeklySell).unwrap();
        assert!((weekly.current_delta() - 0.45).abs() < 0.03);
        assert_eq!(harness.journal.tags(), vec!["ADJ_WEEKLY_RISE", "ADJ_WEEKLY_RISE"]);
    }

    #[tokio::test]
    async fn test_failed_buyback_keeps_old_weekly() {
        let (harness, mut controller) = Harness::build(variant());
        harness.execution.fail_side(Side::Buy);
        held(controller.state_mut(), 0.85, 0.5);
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(23700), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.85, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(harness.execution.requests().len(), 1);
        let weekly = controller.state().leg(RoleTag::WeeklySell).unwrap();
        assert_eq!(weekly.instrument_key(), "NSE_FO|W23800");
    }

    #[tokio::test]
    async fn test_integrity_guard_skips_deep_itm_low_delta() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.05, 0.5);
        // Spot far below the 23800 strike yet delta reads near zero.
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(23000), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.05, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_monthly_fall_buys_new_hedge_first() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.5, 0.85);
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(23510), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.5, 0.85);

        controller.run_cycle(&snapshot).await;

        let orders = harness.execution.requests();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].side, Side::Buy);
        assert!(orders[0].instrument_key.ends_with("23500"));
        assert_eq!(orders[1].instrument_key, "NSE_FO|M24000");
        assert_eq!(orders[1].side, Side::Sell);
    }

    #[tokio::test]
    async fn test_integrity_guard_skips_monthly_roll() {
        let (harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.5, 0.05);
        // 24000 put with spot 500 points below it cannot carry a 0.05 delta.
        let mut snapshot = market(at(2026, 3, 5, 11, 0), dec!(23500), chains());
        snapshot.flags.can_adjust = true;
        quote_held(&mut snapshot, 0.5, 0.05);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Idle);
        assert!(harness.execution.requests().is_empty());
        let monthly = controller.state().leg(RoleTag::MonthlyBuy).unwrap();
        assert_eq!(monthly.instrument_key(), "NSE_FO|M24000");
    }

    #[tokio::test]
    async fn test_gap_forces_roll_before_delta_checks() {
        let (harness, mut controller) = Harness::build(variant());
        // Delta inside the band: no delta trigger would fire.
        held(controller.state_mut(), 0.5, 0.5);
        let mut snapshot = market(at(2026, 3, 5, 9, 16), dec!(22800), chains());
        quote_held(&mut snapshot, 0.5, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Adjustment);
        assert_eq!(harness.journal.tags()[0], "GAP_ROLL_WEEKLY");
    }

    #[tokio::test]
    async fn test_rollover_on_day_before_weekly_expiry() {
        let (_harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.5, 0.5);
        let mut snapshot = market(at(2026, 3, 9, 15, 5), dec!(24000), chains());
        quote_held(&mut snapshot, 0.5, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Rollover);
        let weekly = controller.state().leg(RoleTag::WeeklySell).unwrap();
        assert_eq!(weekly.expiry_date(), Some(next_weekly_expiry()));
        assert_eq!(controller.state().last_rollover_date, Some(date(2026, 3, 9)));
    }

    #[tokio::test]
    async fn test_pre_expiry_exit_when_weekly_expires_with_the_month() {
        let (_harness, mut controller) = Harness::build(variant());
        held(controller.state_mut(), 0.5, 0.5);
        // Monthly expiry tomorrow (Mar 10 is a Tuesday); the weekly leg
        // expires on it, so the structure exits.
        let mut snapshot = market(at(2026, 3, 9, 15, 1), dec!(24000), chains());
        snapshot.flags.is_day_before_monthly_expiry = true;
        quote_held(&mut snapshot, 0.5, 0.5);

        let outcome = controller.run_cycle(&snapshot).await;

        assert_eq!(outcome.action, CycleAction::Exit(ExitReason::PreExpiry));
        assert!(controller.state().is_empty());
    }
}
