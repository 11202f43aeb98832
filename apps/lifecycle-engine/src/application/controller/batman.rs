//! Batman: a call-side and a put-side ratio spread, each with a far
//! out-of-the-money hedge.
//!
//! Per side: one long wing, two short core lots and one long hedge. Only
//! the winning side is adjusted: when its combined sold delta decays below
//! the trigger, both core lots are bought back and resold closer to spot.

use rust_decimal::Decimal;

use crate::config::{BatmanConfig, StrategyKind};
use crate::domain::leg::{OptionType, RoleTag, StrategyState};
use crate::domain::market::{BrokerPositionRow, ExpiryChain};
use crate::domain::reconciliation::{ReconciliationReport, reconcile_keyed};
use crate::domain::selection::{
    CHAIN_STRIKE_STEP, DeltaTarget, SelectionError, round_to_step, select_by_delta, select_by_distance,
};
use crate::domain::timing;

use super::variant::{
    CycleContext, ExitReason, LegOrder, LegRoll, Plan, RollSequence, StrategyVariant, combined_delta,
};

const ROLES: &[RoleTag] = &[
    RoleTag::CeHedge,
    RoleTag::PeHedge,
    RoleTag::CeWing,
    RoleTag::PeWing,
    RoleTag::CeCore,
    RoleTag::PeCore,
];

/// Batman variant.
#[derive(Debug, Clone)]
pub struct BatmanVariant {
    config: BatmanConfig,
}

impl BatmanVariant {
    /// Create the variant.
    #[must_use]
    pub const fn new(config: BatmanConfig) -> Self {
        Self { config }
    }

    fn core_quantity(&self, lot_size: u32) -> u32 {
        lot_size * self.config.core_lots
    }

    /// Strike `distance` away from spot on the side of `option_type`.
    fn distance_target(spot: Decimal, distance: Decimal, option_type: OptionType) -> Decimal {
        let raw = match option_type {
            OptionType::Call => spot + distance,
            OptionType::Put => spot - distance,
        };
        round_to_step(raw, CHAIN_STRIKE_STEP)
    }

    fn by_distance(
        &self,
        ctx: &CycleContext<'_>,
        chain: &ExpiryChain,
        role: RoleTag,
        distance: Decimal,
        quantity: u32,
    ) -> Result<LegOrder, SelectionError> {
        let option_type = role.option_type();
        let target = Self::distance_target(ctx.market.spot, distance, option_type);
        let contract = select_by_distance(chain, option_type, target)?;
        Ok(LegOrder::new(role, contract, quantity))
    }

    fn hedge(&self, ctx: &CycleContext<'_>, chain: &ExpiryChain, role: RoleTag) -> Result<LegOrder, SelectionError> {
        let contract = select_by_delta(
            chain,
            role.option_type(),
            ctx.market.spot,
            DeltaTarget::delta(self.config.hedge_delta),
        )?;
        Ok(LegOrder::new(role, contract, ctx.lot_size))
    }

    /// Core role whose combined sold delta has decayed below the trigger.
    fn winning_core(&self, ctx: &CycleContext<'_>) -> Option<(RoleTag, f64)> {
        [RoleTag::CeCore, RoleTag::PeCore]
            .into_iter()
            .filter(|role| ctx.state.has(*role))
            .map(|role| (role, combined_delta(ctx.state, &[role], ctx.lot_size)))
            .find(|(_, delta)| *delta < self.config.adjustment_trigger_delta)
    }
}

impl StrategyVariant for BatmanVariant {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Batman
    }

    fn required_roles(&self) -> &'static [RoleTag] {
        ROLES
    }

    fn reconcile(
        &self,
        state: &mut StrategyState,
        rows: &[BrokerPositionRow],
        _underlying: &str,
    ) -> ReconciliationReport {
        reconcile_keyed(state, rows)
    }

    fn exit_signal(&self, ctx: &CycleContext<'_>) -> Option<ExitReason> {
        if ctx.state.adjustment_count > self.config.max_adjustments {
            tracing::warn!(
                strategy = "batman",
                adjustments = ctx.state.adjustment_count,
                max = self.config.max_adjustments,
                "Adjustment cap exceeded"
            );
            return Some(ExitReason::MaxAdjustments);
        }

        let expiry = ctx.state.legs.values().filter_map(|leg| leg.expiry_date()).min()?;
        if expiry == ctx.next_trading_day() && ctx.at_or_after(&self.config.exit_time) {
            tracing::info!(strategy = "batman", expiry = %expiry, "Expiry is next session; exiting");
            return Some(ExitReason::ExpiryEve);
        }
        None
    }

    fn entry(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        // Only fresh structures; partial legs are left to reconciliation.
        if !ctx.state.is_empty() {
            return Ok(None);
        }
        if !timing::is_entry_window(
            ctx.market.now,
            self.config.entry_weekday,
            &self.config.entry_time,
            Some(&self.config.entry_cutoff),
            ctx.timing.override_timing_checks,
        ) {
            return Ok(None);
        }
        let Some(chain) = ctx.market.chains.current_weekly.as_ref() else {
            tracing::warn!(strategy = "batman", "Current weekly chain unavailable");
            return Ok(None);
        };

        let core = self.core_quantity(ctx.lot_size);
        let orders = vec![
            self.hedge(ctx, chain, RoleTag::CeHedge)?,
            self.hedge(ctx, chain, RoleTag::PeHedge)?,
            self.by_distance(ctx, chain, RoleTag::CeWing, self.config.wing_distance, ctx.lot_size)?,
            self.by_distance(ctx, chain, RoleTag::PeWing, self.config.wing_distance, ctx.lot_size)?,
            self.by_distance(ctx, chain, RoleTag::CeCore, self.config.core_distance, core)?,
            self.by_distance(ctx, chain, RoleTag::PeCore, self.config.core_distance, core)?,
        ];
        tracing::info!(
            strategy = "batman",
            spot = %ctx.market.spot,
            expiry = %chain.expiry,
            "Entering batman"
        );
        Ok(Some(Plan::Open { orders, tag: "ENTRY" }))
    }

    fn adjustment(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        let Some((role, delta)) = self.winning_core(ctx) else {
            return Ok(None);
        };
        tracing::info!(
            strategy = "batman",
            role = %role,
            combined_delta = delta,
            trigger = self.config.adjustment_trigger_delta,
            "Winning side decayed"
        );

        if ctx.state.adjustment_count >= self.config.max_adjustments {
            return Ok(Some(Plan::Exit(ExitReason::MaxAdjustments)));
        }

        let Some(chain) = ctx
            .state
            .leg(role)
            .and_then(|leg| leg.expiry_date())
            .and_then(|expiry| ctx.market.chains.for_expiry(expiry))
            .or(ctx.market.chains.current_weekly.as_ref())
        else {
            tracing::warn!(strategy = "batman", role = %role, "No chain for the core roll");
            return Ok(None);
        };

        let per_lot = self.config.adjustment_target_delta / f64::from(self.config.core_lots.max(1));
        let contract = select_by_delta(chain, role.option_type(), ctx.market.spot, DeltaTarget::delta(per_lot))?;
        let tag = match role {
            RoleTag::CeCore => "ADJ_CE_CORE",
            _ => "ADJ_PE_CORE",
        };
        Ok(Some(Plan::Roll {
            rolls: vec![LegRoll {
                replacement: LegOrder::new(role, contract, self.core_quantity(ctx.lot_size)),
                sequence: RollSequence::CloseFirst,
            }],
            tag,
        }))
    }
}
