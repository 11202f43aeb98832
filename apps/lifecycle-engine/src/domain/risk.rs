//! Risk Policy
//!
//! Delta thresholds, portfolio P&L against the loss limit, opening-gap
//! magnitude and the data-integrity guard on suspicious deltas.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::leg::{Leg, OptionType, StrategyState};
use super::market::{BrokerPositionRow, MarketSnapshot};

/// Delta triggers and roll targets for one leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRule {
    /// Roll when delta rises to or above this (market moved against the leg).
    pub trigger_high: f64,
    /// Roll when delta decays to or below this.
    pub trigger_low: f64,
    /// Target delta after a high-trigger roll.
    pub target_fall: f64,
    /// Target delta after a low-trigger roll; never equal to `target_fall`.
    pub target_rise: f64,
}

/// Direction of a delta-triggered roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaTrigger {
    /// Delta at or above the high threshold.
    Fall,
    /// Delta at or below the low threshold.
    Rise,
}

impl DeltaRule {
    /// Evaluate a delta reading.
    #[must_use]
    pub fn evaluate(&self, delta: f64) -> Option<DeltaTrigger> {
        if delta >= self.trigger_high {
            Some(DeltaTrigger::Fall)
        } else if delta <= self.trigger_low {
            Some(DeltaTrigger::Rise)
        } else {
            None
        }
    }

    /// Roll target for a trigger.
    #[must_use]
    pub const fn target(&self, trigger: DeltaTrigger) -> f64 {
        match trigger {
            DeltaTrigger::Fall => self.target_fall,
            DeltaTrigger::Rise => self.target_rise,
        }
    }
}

/// Limits the policy checks against.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    /// Absolute loss limit; zero disables.
    pub max_loss: Decimal,
    /// Gap percentage that forces a roll.
    pub gap_forced_roll_pct: f64,
    /// Fraction of the loss limit that triggers an emergency exit in the gap window.
    pub gap_emergency_exit_fraction: Decimal,
    /// Suspicious-delta floor.
    pub integrity_delta_floor: f64,
}

/// Open P&L over the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPnl {
    /// Sum over quoted legs.
    pub total: Decimal,
    /// Some leg had no quote and contributed zero.
    pub missing_quotes: bool,
}

/// Opening-gap verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapDecision {
    /// Nothing to do.
    Hold,
    /// Close everything.
    EmergencyExit,
    /// Roll the short leg at its fall target.
    ForcedRoll {
        /// Observed gap in percent.
        gap_pct: f64,
    },
}

/// Stateless evaluator over [`RiskLimits`].
#[derive(Debug, Clone)]
pub struct RiskPolicy {
    limits: RiskLimits,
}

impl RiskPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Open P&L using the snapshot's last prices.
    #[must_use]
    pub fn open_pnl(state: &StrategyState, market: &MarketSnapshot) -> OpenPnl {
        state.legs.values().fold(
            OpenPnl {
                total: Decimal::ZERO,
                missing_quotes: false,
            },
            |mut acc, leg| {
                match market.last_price(leg.instrument_key()) {
                    Some(ltp) => acc.total += leg.pnl_at(ltp),
                    None => acc.missing_quotes = true,
                }
                acc
            },
        )
    }

    /// Whether open plus booked loss breaches the limit.
    ///
    /// Never fires while a leg is unquoted or the limit is zero.
    #[must_use]
    pub fn max_loss_breached(&self, open: OpenPnl, realized: Decimal) -> bool {
        if self.limits.max_loss.is_zero() || open.missing_quotes {
            return false;
        }
        open.total + realized <= -self.limits.max_loss.abs()
    }

    /// Absolute move of `spot` from `reference`, in percent.
    #[must_use]
    pub fn gap_pct(spot: Decimal, reference: Decimal) -> Option<f64> {
        if reference <= Decimal::ZERO {
            return None;
        }
        ((spot - reference).abs() / reference * Decimal::ONE_HUNDRED).to_f64()
    }

    /// Gap verdict inside the opening window.
    #[must_use]
    pub fn evaluate_gap(&self, open: OpenPnl, spot: Decimal, reference: Option<Decimal>) -> GapDecision {
        let emergency_floor = -self.limits.max_loss.abs() * self.limits.gap_emergency_exit_fraction;
        if !self.limits.max_loss.is_zero() && !open.missing_quotes && open.total <= emergency_floor {
            return GapDecision::EmergencyExit;
        }
        match reference.and_then(|r| Self::gap_pct(spot, r)) {
            Some(gap_pct) if gap_pct >= self.limits.gap_forced_roll_pct => {
                GapDecision::ForcedRoll { gap_pct }
            }
            _ => GapDecision::Hold,
        }
    }

    /// Whether a leg's delta is implausibly low for how deep in the money it is.
    #[must_use]
    pub fn integrity_suspect(&self, leg: &Leg, spot: Decimal) -> bool {
        if leg.current_delta() >= self.limits.integrity_delta_floor {
            return false;
        }
        match leg.option_type() {
            OptionType::Put => spot < leg.strike(),
            OptionType::Call => spot > leg.strike(),
        }
    }

    /// Broker-side P&L across rows.
    #[must_use]
    pub fn broker_pnl(rows: &[BrokerPositionRow]) -> Decimal {
        rows.iter().map(BrokerPositionRow::broker_pnl).sum()
    }
}
