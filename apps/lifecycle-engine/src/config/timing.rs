//! Entry, rollover and pre-expiry timing settings plus the holiday list.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::default_true;
use crate::domain::timing::EconomicEvent;

/// Timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Calendar entry time on monthly-expiry day (HH:MM).
    #[serde(default = "default_entry_time")]
    pub entry_time: String,
    /// In LIVE mode, only open a new calendar cycle on monthly-expiry day.
    #[serde(default = "default_true")]
    pub strict_monthly_expiry_entry: bool,
    /// Bypass every entry/exit time gate.
    #[serde(default)]
    pub override_timing_checks: bool,
    /// Time on T-1 at/after which the near leg is rolled (HH:MM).
    #[serde(default = "default_early_rollover_time")]
    pub early_rollover_time: String,
    /// Enable the T-1 rollover.
    #[serde(default = "default_true")]
    pub rollover_on_t1_enabled: bool,
    /// Exit everything on the day before monthly expiry.
    #[serde(default = "default_true")]
    pub auto_exit_before_monthly_expiry: bool,
    /// Time on the day before monthly expiry at/after which the exit fires (HH:MM).
    #[serde(default = "default_pre_expiry_exit_time")]
    pub pre_expiry_exit_time: String,
    /// Exchange holidays.
    #[serde(default = "default_holidays")]
    pub holidays: Vec<NaiveDate>,
    /// Optional endpoint returning the holiday list.
    #[serde(default)]
    pub holiday_api_url: Option<String>,
    /// Scheduled announcements to warn about ahead of time.
    #[serde(default)]
    pub economic_events: Vec<EconomicEvent>,
    /// Days ahead that holidays and events are warned about.
    #[serde(default = "default_event_lookahead_days")]
    pub event_lookahead_days: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            entry_time: default_entry_time(),
            strict_monthly_expiry_entry: true,
            override_timing_checks: false,
            early_rollover_time: default_early_rollover_time(),
            rollover_on_t1_enabled: true,
            auto_exit_before_monthly_expiry: true,
            pre_expiry_exit_time: default_pre_expiry_exit_time(),
            holidays: default_holidays(),
            holiday_api_url: None,
            economic_events: Vec::new(),
            event_lookahead_days: default_event_lookahead_days(),
        }
    }
}

const fn default_event_lookahead_days() -> u32 {
    5
}

fn default_entry_time() -> String {
    "15:15".to_string()
}

fn default_early_rollover_time() -> String {
    "15:00".to_string()
}

fn default_pre_expiry_exit_time() -> String {
    "15:00".to_string()
}

/// Known exchange holidays for 2026.
fn default_holidays() -> Vec<NaiveDate> {
    [
        (1, 26),
        (3, 7),
        (3, 24),
        (4, 14),
        (4, 20),
        (5, 1),
        (8, 15),
        (10, 2),
        (10, 21),
        (11, 9),
        (12, 25),
    ]
    .into_iter()
    .filter_map(|(month, day)| NaiveDate::from_ymd_opt(2026, month, day))
    .collect()
}
