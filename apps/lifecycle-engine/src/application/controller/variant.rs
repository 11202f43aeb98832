//! Strategy Variant Hooks
//!
//! The controller walks the lifecycle stages once per cycle. A variant
//! supplies the roles it needs, how broker rows map onto those roles, and
//! the orders each stage should place. Hooks are pure: they read the
//! [`CycleContext`] and return a [`Plan`] for the controller to execute.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::config::{StrategyKind, TimingConfig, TradingMode};
use crate::domain::leg::{RoleTag, Side, StrategyState};
use crate::domain::market::{BrokerPositionRow, ExpiryChain, MarketSnapshot, OptionChainEntry};
use crate::domain::reconciliation::ReconciliationReport;
use crate::domain::risk::{OpenPnl, RiskPolicy};
use crate::domain::selection::SelectionError;
use crate::domain::timing::{self, HolidayCalendar};

/// Read-only view of one cycle handed to every hook.
pub struct CycleContext<'a> {
    /// Market data for this cycle.
    pub market: &'a MarketSnapshot,
    /// Ledger after reconciliation, cleanup and delta refresh.
    pub state: &'a StrategyState,
    /// Exchange holidays.
    pub calendar: &'a HolidayCalendar,
    /// Portfolio limits.
    pub risk: &'a RiskPolicy,
    /// Entry, rollover and pre-expiry timing.
    pub timing: &'a TimingConfig,
    /// Trading mode.
    pub mode: TradingMode,
    /// Exchange lot size.
    pub lot_size: u32,
    /// Mark-to-market P&L of the live legs.
    pub open_pnl: OpenPnl,
    /// Inside the post-open gap window with gap protection on.
    pub in_gap_window: bool,
}

impl<'a> CycleContext<'a> {
    /// Trading date.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.market.today()
    }

    /// Whether the wall clock has reached `mark` (HH:MM).
    #[must_use]
    pub fn at_or_after(&self, mark: &str) -> bool {
        timing::is_at_or_after(self.market.now, mark)
    }

    /// Next session after today.
    #[must_use]
    pub fn next_trading_day(&self) -> NaiveDate {
        self.calendar.next_trading_day(self.today())
    }

    /// First chain expiring strictly after `expiry`, nearest first.
    #[must_use]
    pub fn chain_after(&self, expiry: NaiveDate) -> Option<&'a ExpiryChain> {
        self.market.chains.iter().find(|chain| chain.expiry > expiry)
    }
}

/// One leg to open.
#[derive(Debug, Clone, PartialEq)]
pub struct LegOrder {
    /// Role the filled leg will take.
    pub role: RoleTag,
    /// Contract to trade.
    pub contract: OptionChainEntry,
    /// Absolute quantity in units.
    pub quantity: u32,
}

impl LegOrder {
    /// Order for `role` on `contract`.
    #[must_use]
    pub fn new(role: RoleTag, contract: &OptionChainEntry, quantity: u32) -> Self {
        Self {
            role,
            contract: contract.clone(),
            quantity,
        }
    }

    /// Opening side, implied by the role.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.role.natural_side()
    }
}

/// Which half of a roll goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollSequence {
    /// Close the old leg, then open the replacement. Used for short legs so
    /// margin is released before the new sale.
    CloseFirst,
    /// Open the replacement, then close the old leg. Used for hedges so the
    /// structure is never unprotected.
    OpenFirst,
}

/// Replace the leg in `replacement.role` with a new contract.
#[derive(Debug, Clone, PartialEq)]
pub struct LegRoll {
    /// New leg.
    pub replacement: LegOrder,
    /// Order of the two halves.
    pub sequence: RollSequence,
}

/// Why a structure is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Realized plus open loss reached the limit.
    MaxLoss,
    /// Large open loss inside the opening gap window.
    GapEmergency,
    /// Adjustment cap reached.
    MaxAdjustments,
    /// Day before the monitored monthly expiry.
    PreExpiry,
    /// One trading day before the structure expires.
    ExpiryEve,
    /// Expiry day of the structure.
    ExpiryDay,
    /// Profit target reached.
    Target,
    /// Stop loss after the repair was used.
    StopLoss,
}

impl ExitReason {
    /// Journal and order tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::MaxLoss => "EXIT_MAX_LOSS",
            Self::GapEmergency => "EXIT_GAP_EMERGENCY",
            Self::MaxAdjustments => "EXIT_MAX_ADJUSTMENTS",
            Self::PreExpiry => "PRE_EXPIRY_EXIT",
            Self::ExpiryEve => "EXIT_T1",
            Self::ExpiryDay => "EXIT_EXPIRY",
            Self::Target => "EXIT_TARGET",
            Self::StopLoss => "EXIT_STOP_LOSS",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Orders a hook wants executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Close every live leg.
    Exit(ExitReason),
    /// Replace legs role by role.
    Roll {
        /// Rolls in execution order.
        rolls: Vec<LegRoll>,
        /// Journal tag.
        tag: &'static str,
    },
    /// Open new legs in order, stopping at the first failure.
    Open {
        /// Orders in execution order.
        orders: Vec<LegOrder>,
        /// Journal tag.
        tag: &'static str,
    },
}

/// Behaviour that differs between leg structures.
pub trait StrategyVariant: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Roles a complete structure holds.
    fn required_roles(&self) -> &'static [RoleTag];

    /// Merge broker rows into the ledger.
    fn reconcile(
        &self,
        state: &mut StrategyState,
        rows: &[BrokerPositionRow],
        underlying: &str,
    ) -> ReconciliationReport;

    /// Variant-specific reason to close everything now.
    fn exit_signal(&self, _ctx: &CycleContext<'_>) -> Option<ExitReason> {
        None
    }

    /// Roll a leg that expires on the next session.
    fn rollover(&self, _ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError> {
        Ok(None)
    }

    /// Open missing legs. Only called while the ledger is incomplete and no
    /// entry cooldown is running.
    fn entry(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError>;

    /// Adjust a live structure.
    fn adjustment(&self, ctx: &CycleContext<'_>) -> Result<Option<Plan>, SelectionError>;
}

/// Sum of `delta × lots` over the given roles.
#[must_use]
pub fn combined_delta(state: &StrategyState, roles: &[RoleTag], lot_size: u32) -> f64 {
    roles
        .iter()
        .filter_map(|role| state.leg(*role))
        .map(|leg| leg.current_delta() * f64::from(leg.lots(lot_size)))
        .sum()
}

/// ATM strike for a given chain step.
#[must_use]
pub fn atm_strike(spot: Decimal, step: Decimal) -> Decimal {
    crate::domain::selection::round_to_step(spot, step)
}
