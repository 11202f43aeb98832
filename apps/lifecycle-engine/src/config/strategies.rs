//! Per-variant strategy parameters.

use chrono::Weekday;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub use crate::domain::risk::DeltaRule;

/// Calendar (weekly short put + monthly long put) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Entry delta for the weekly short leg.
    #[serde(default = "default_entry_delta")]
    pub weekly_entry_delta: f64,
    /// Entry delta for the monthly hedge. Ignored while `monthly_force_atm` is set.
    #[serde(default = "default_entry_delta")]
    pub monthly_entry_delta: f64,
    /// Weekly leg triggers and targets.
    #[serde(default = "default_weekly_rule")]
    pub weekly: DeltaRule,
    /// Monthly leg triggers and targets.
    #[serde(default = "default_monthly_rule")]
    pub monthly: DeltaRule,
    /// Pick the monthly hedge at the round-100 ATM strike on entry and fall rolls.
    #[serde(default = "super::default_true")]
    pub monthly_force_atm: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            weekly_entry_delta: default_entry_delta(),
            monthly_entry_delta: default_entry_delta(),
            weekly: default_weekly_rule(),
            monthly: default_monthly_rule(),
            monthly_force_atm: true,
        }
    }
}

const fn default_entry_delta() -> f64 {
    0.50
}

const fn default_weekly_rule() -> DeltaRule {
    DeltaRule {
        trigger_high: 0.80,
        trigger_low: 0.10,
        target_fall: 0.50,
        target_rise: 0.45,
    }
}

const fn default_monthly_rule() -> DeltaRule {
    DeltaRule {
        trigger_high: 0.80,
        trigger_low: 0.10,
        target_fall: 0.50,
        target_rise: 0.35,
    }
}

/// Weekly put butterfly parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IronflyConfig {
    /// Capital base for stop-loss and target percentages.
    #[serde(default = "default_ironfly_capital")]
    pub capital: Decimal,
    /// Loss fraction of capital that triggers the adjustment (then the exit).
    #[serde(default = "default_ironfly_stop_loss")]
    pub stop_loss_pct: Decimal,
    /// Profit fraction of capital that closes the structure.
    #[serde(default = "default_ironfly_target")]
    pub target_pct: Decimal,
    /// Fallback entry weekday when no current-weekly chain is available.
    #[serde(default = "default_ironfly_weekday")]
    pub entry_weekday: Weekday,
    /// Entry time (HH:MM).
    #[serde(default = "default_ironfly_entry_time")]
    pub entry_time: String,
    /// Exit time on the body's expiry day (HH:MM).
    #[serde(default = "default_ironfly_exit_time")]
    pub exit_time: String,
    /// Strike offsets from ATM for the upper wing, body and lower wing.
    #[serde(default = "default_ironfly_offsets")]
    pub offsets: [Decimal; 3],
    /// Distance moved inward from the upper wing for the call calendar.
    #[serde(default = "default_ironfly_inward_offset")]
    pub adjustment_inward_offset: Decimal,
}

impl Default for IronflyConfig {
    fn default() -> Self {
        Self {
            capital: default_ironfly_capital(),
            stop_loss_pct: default_ironfly_stop_loss(),
            target_pct: default_ironfly_target(),
            entry_weekday: default_ironfly_weekday(),
            entry_time: default_ironfly_entry_time(),
            exit_time: default_ironfly_exit_time(),
            offsets: default_ironfly_offsets(),
            adjustment_inward_offset: default_ironfly_inward_offset(),
        }
    }
}

const fn default_ironfly_capital() -> Decimal {
    dec!(180000)
}

const fn default_ironfly_stop_loss() -> Decimal {
    dec!(0.01)
}

const fn default_ironfly_target() -> Decimal {
    dec!(0.03)
}

const fn default_ironfly_weekday() -> Weekday {
    Weekday::Tue
}

fn default_ironfly_entry_time() -> String {
    "12:00".to_string()
}

fn default_ironfly_exit_time() -> String {
    "15:00".to_string()
}

const fn default_ironfly_offsets() -> [Decimal; 3] {
    [dec!(-50), dec!(-250), dec!(-450)]
}

const fn default_ironfly_inward_offset() -> Decimal {
    dec!(100)
}

/// Batman parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatmanConfig {
    /// Entry weekday.
    #[serde(default = "default_batman_weekday")]
    pub entry_weekday: Weekday,
    /// Entry window start (HH:MM).
    #[serde(default = "default_batman_entry_time")]
    pub entry_time: String,
    /// Entry window end, exclusive (HH:MM).
    #[serde(default = "default_batman_entry_cutoff")]
    pub entry_cutoff: String,
    /// Wing distance from spot.
    #[serde(default = "default_batman_wing_distance")]
    pub wing_distance: Decimal,
    /// Core distance from spot.
    #[serde(default = "default_batman_core_distance")]
    pub core_distance: Decimal,
    /// Delta of the far OTM hedges.
    #[serde(default = "default_batman_hedge_delta")]
    pub hedge_delta: f64,
    /// Combined sold delta below which the winning side is rolled.
    #[serde(default = "default_batman_trigger")]
    pub adjustment_trigger_delta: f64,
    /// Combined target delta for the replacement core lots.
    #[serde(default = "default_batman_target")]
    pub adjustment_target_delta: f64,
    /// Adjustment cap; reaching it forces a full exit.
    #[serde(default = "default_batman_max_adjustments")]
    pub max_adjustments: u32,
    /// Exit time on T-1 (HH:MM).
    #[serde(default = "default_batman_exit_time")]
    pub exit_time: String,
    /// Lots sold on each core.
    #[serde(default = "default_batman_core_lots")]
    pub core_lots: u32,
}

impl Default for BatmanConfig {
    fn default() -> Self {
        Self {
            entry_weekday: default_batman_weekday(),
            entry_time: default_batman_entry_time(),
            entry_cutoff: default_batman_entry_cutoff(),
            wing_distance: default_batman_wing_distance(),
            core_distance: default_batman_core_distance(),
            hedge_delta: default_batman_hedge_delta(),
            adjustment_trigger_delta: default_batman_trigger(),
            adjustment_target_delta: default_batman_target(),
            max_adjustments: default_batman_max_adjustments(),
            exit_time: default_batman_exit_time(),
            core_lots: default_batman_core_lots(),
        }
    }
}

const fn default_batman_weekday() -> Weekday {
    Weekday::Wed
}

fn default_batman_entry_time() -> String {
    "10:00".to_string()
}

fn default_batman_entry_cutoff() -> String {
    "15:00".to_string()
}

const fn default_batman_wing_distance() -> Decimal {
    dec!(100)
}

const fn default_batman_core_distance() -> Decimal {
    dec!(200)
}

const fn default_batman_hedge_delta() -> f64 {
    0.05
}

const fn default_batman_trigger() -> f64 {
    0.40
}

const fn default_batman_target() -> f64 {
    0.70
}

const fn default_batman_max_adjustments() -> u32 {
    3
}

fn default_batman_exit_time() -> String {
    "15:00".to_string()
}

const fn default_batman_core_lots() -> u32 {
    2
}
