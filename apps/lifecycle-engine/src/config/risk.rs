//! Portfolio risk limits and opening-gap protection.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::default_true;

/// Risk configuration shared by every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Absolute loss that forces a full exit. Zero disables the check.
    #[serde(default = "default_max_loss")]
    pub max_loss: Decimal,
    /// Enable opening-gap protection.
    #[serde(default = "default_true")]
    pub gap_protection_enabled: bool,
    /// Minutes after market open that count as the gap window.
    #[serde(default = "default_gap_window_minutes")]
    pub gap_window_minutes: u32,
    /// Spot move (percent of the reference entry spot) that forces a roll.
    #[serde(default = "default_gap_forced_roll_pct")]
    pub gap_forced_roll_pct: f64,
    /// Fraction of `max_loss` that triggers an emergency exit inside the gap window.
    #[serde(default = "default_gap_emergency_exit_fraction")]
    pub gap_emergency_exit_fraction: Decimal,
    /// Put deltas below this while spot is under the strike are treated as bad data.
    #[serde(default = "default_integrity_delta_floor")]
    pub integrity_delta_floor: f64,
    /// Seconds to wait before retrying a failed entry.
    #[serde(default = "default_entry_cooldown_secs")]
    pub entry_cooldown_secs: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_loss: default_max_loss(),
            gap_protection_enabled: true,
            gap_window_minutes: default_gap_window_minutes(),
            gap_forced_roll_pct: default_gap_forced_roll_pct(),
            gap_emergency_exit_fraction: default_gap_emergency_exit_fraction(),
            integrity_delta_floor: default_integrity_delta_floor(),
            entry_cooldown_secs: default_entry_cooldown_secs(),
        }
    }
}

const fn default_max_loss() -> Decimal {
    dec!(20000)
}

const fn default_gap_window_minutes() -> u32 {
    5
}

const fn default_gap_forced_roll_pct() -> f64 {
    1.25
}

const fn default_gap_emergency_exit_fraction() -> Decimal {
    dec!(0.8)
}

const fn default_integrity_delta_floor() -> f64 {
    0.10
}

const fn default_entry_cooldown_secs() -> i64 {
    300
}

impl From<&RiskConfig> for crate::domain::risk::RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_loss: config.max_loss,
            gap_forced_roll_pct: config.gap_forced_roll_pct,
            gap_emergency_exit_fraction: config.gap_emergency_exit_fraction,
            integrity_delta_floor: config.integrity_delta_floor,
        }
    }
}
