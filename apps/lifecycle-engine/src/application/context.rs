//! Market Context
//!
//! Turns one raw [`FeedFrame`] into the [`MarketSnapshot`] every controller
//! sees for a tick. Listed expiries are bucketed into current weekly, next
//! weekly and monthly chains, missing Greeks are filled in, and the gating
//! flags shared by all strategies are derived once.
//!
//! Bucketing rules:
//!
//! - An expiry falling on today is skipped; the next listed expiry becomes
//!   the current weekly and `expiry_skipped` is raised.
//! - The monthly bucket is the last expiry of the month after the current
//!   weekly, then of the month after that, then the last listed expiry.
//!   With a single tradable expiry there is no monthly bucket.
//!
//! The first frame of each date also logs upcoming holidays and configured
//! economic events.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::ports::FeedFrame;
use crate::config::{Config, TimingConfig, TradingMode};
use crate::domain::market::{
    BrokerSnapshot, ChainSet, ExpiryChain, GreeksQuote, MarketFlags, MarketSnapshot,
    OptionChainEntry,
};
use crate::domain::pricing::{DEFAULT_VOLATILITY, bs_delta, implied_volatility};
use crate::domain::timing::{self, HolidayCalendar};

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;
const MIN_TIME_TO_EXPIRY: f64 = 0.0001;

/// Context derivation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The frame lists no tradable expiry at all.
    #[error("No tradable expiry listed on or after {today}, found {found}")]
    InsufficientExpiries {
        /// Trading date of the frame.
        today: NaiveDate,
        /// Expiries found on or after it.
        found: usize,
    },
}

/// Expiry dates assigned to each chain bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryBuckets {
    /// Nearest tradable expiry.
    pub current_weekly: NaiveDate,
    /// The expiry after it, if listed.
    pub next_weekly: Option<NaiveDate>,
    /// Monitored monthly expiry; absent when only one expiry is tradable.
    pub monthly: Option<NaiveDate>,
    /// Today's expiry was passed over.
    pub skipped: bool,
}

const fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn last_in_month(expiries: &[NaiveDate], (year, month): (i32, u32)) -> Option<NaiveDate> {
    expiries
        .iter()
        .copied()
        .filter(|d| d.year() == year && d.month() == month)
        .max()
}

/// Assign listed expiries to buckets for `today`.
///
/// A lone tradable expiry fills the current weekly bucket and leaves the
/// monthly bucket empty.
///
/// # Errors
///
/// Fails when no expiry is tradable on or after `today`.
pub fn bucket_expiries(listed: &[NaiveDate], today: NaiveDate) -> Result<ExpiryBuckets, ContextError> {
    let expiries: Vec<NaiveDate> = listed
        .iter()
        .copied()
        .filter(|d| *d >= today)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let skipped = expiries.first() == Some(&today);
    let tradable = if skipped { &expiries[1..] } else { &expiries[..] };
    let Some((&current_weekly, rest)) = tradable.split_first() else {
        return Err(ContextError::InsufficientExpiries {
            today,
            found: expiries.len(),
        });
    };
    let next_weekly = rest.first().copied();

    let monthly = if rest.is_empty() {
        None
    } else {
        let following = next_month(current_weekly.year(), current_weekly.month());
        last_in_month(tradable, following)
            .or_else(|| last_in_month(tradable, next_month(following.0, following.1)))
            .or_else(|| tradable.last().copied())
    };

    Ok(ExpiryBuckets {
        current_weekly,
        next_weekly,
        monthly,
        skipped,
    })
}

/// Whether `date` is the last listed expiry of its month.
#[must_use]
pub fn is_monthly_expiry(listed: &[NaiveDate], date: NaiveDate) -> bool {
    last_in_month(listed, (date.year(), date.month())) == Some(date)
}

/// Whether the next trading day is the expiry the monthly exit watches.
///
/// True when the next session is the current weekly expiry and that expiry
/// is either the last of its month or the monthly bucket itself.
#[must_use]
pub fn is_day_before_monthly_expiry(
    listed: &[NaiveDate],
    buckets: &ExpiryBuckets,
    calendar: &HolidayCalendar,
    today: NaiveDate,
) -> bool {
    let tomorrow = calendar.next_trading_day(today);
    if tomorrow != buckets.current_weekly {
        return false;
    }
    is_monthly_expiry(listed, tomorrow) || Some(tomorrow) == buckets.monthly
}

/// Settings the context builder reads.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Trading mode.
    pub mode: TradingMode,
    /// Timing gates.
    pub timing: TimingConfig,
    /// Adjustment candle length in minutes.
    pub adjust_interval_minutes: u32,
    /// Risk-free rate for filled-in Greeks.
    pub risk_free_rate: f64,
}

impl From<&Config> for ContextSettings {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.engine.mode,
            timing: config.timing.clone(),
            adjust_interval_minutes: config.engine.adjust_interval_minutes,
            risk_free_rate: config.engine.risk_free_rate,
        }
    }
}

/// Builds one [`MarketSnapshot`] per tick.
///
/// Keeps the previous spot and the last adjustment candle so that each
/// candle opens the adjustment gate exactly once.
#[derive(Debug)]
pub struct MarketContextBuilder {
    settings: ContextSettings,
    calendar: Arc<HolidayCalendar>,
    previous_spot: Option<Decimal>,
    last_candle: Option<NaiveDateTime>,
    last_event_check: Option<NaiveDate>,
}

impl MarketContextBuilder {
    /// Create a builder.
    #[must_use]
    pub const fn new(settings: ContextSettings, calendar: Arc<HolidayCalendar>) -> Self {
        Self {
            settings,
            calendar,
            previous_spot: None,
            last_candle: None,
            last_event_check: None,
        }
    }

    /// Build the snapshot for `frame` with the given broker positions.
    ///
    /// # Errors
    ///
    /// Fails when the frame's chain does not list enough expiries.
    pub fn build(&mut self, mut frame: FeedFrame, broker: BrokerSnapshot) -> Result<MarketSnapshot, ContextError> {
        let now = frame.now;
        let today = now.date();
        self.warn_upcoming(today);
        let listed: Vec<NaiveDate> = frame.chain.iter().map(|e| e.expiry_date).collect();
        let buckets = bucket_expiries(&listed, today)?;

        let mut by_expiry: BTreeMap<NaiveDate, Vec<OptionChainEntry>> = BTreeMap::new();
        let chain = std::mem::take(&mut frame.chain);
        for entry in chain {
            let entry = self.enrich(entry, &frame, now);
            by_expiry.entry(entry.expiry_date).or_default().push(entry);
        }
        let chain_for = |expiry: NaiveDate| {
            by_expiry
                .get(&expiry)
                .map(|entries| ExpiryChain::new(expiry, entries.clone()))
        };
        let chains = ChainSet {
            current_weekly: chain_for(buckets.current_weekly),
            next_weekly: buckets.next_weekly.and_then(chain_for),
            monthly: buckets.monthly.and_then(chain_for),
        };

        let is_expiry_today = is_monthly_expiry(&listed, today);
        let flags = MarketFlags {
            can_enter_new_cycle: self.can_enter_new_cycle(now, is_expiry_today),
            can_adjust: self.take_candle(now),
            is_expiry_today,
            is_day_before_monthly_expiry: is_day_before_monthly_expiry(
                &listed,
                &buckets,
                &self.calendar,
                today,
            ),
            expiry_skipped: buckets.skipped,
        };
        if buckets.monthly.is_none() {
            tracing::warn!(today = %today, current_weekly = %buckets.current_weekly, "Only one expiry listed; monthly chain unavailable");
        }
        if buckets.skipped {
            tracing::debug!(today = %today, current_weekly = %buckets.current_weekly, "Today's expiry skipped");
        }

        let previous_spot = self.previous_spot.replace(frame.spot);
        Ok(MarketSnapshot {
            now,
            spot: frame.spot,
            previous_spot,
            chains,
            quotes: frame.quotes,
            greeks: frame.greeks,
            broker,
            flags,
        })
    }

    /// Fill price, IV, time to expiry and delta where the feed left gaps.
    /// Log holidays and economic events ahead, once per trading date.
    /// Returns the number of warnings emitted.
    pub fn warn_upcoming(&mut self, today: NaiveDate) -> usize {
        if self.last_event_check == Some(today) {
            return 0;
        }
        self.last_event_check = Some(today);

        let warnings = timing::upcoming_warnings(
            &self.settings.timing.economic_events,
            &self.calendar,
            today,
            self.settings.timing.event_lookahead_days,
        );
        for warning in &warnings {
            tracing::warn!(date = %warning.date(), "{warning}");
        }
        warnings.len()
    }

    fn enrich(&self, mut entry: OptionChainEntry, frame: &FeedFrame, now: NaiveDateTime) -> OptionChainEntry {
        let greeks = frame
            .greeks
            .get(&entry.instrument_key)
            .copied()
            .unwrap_or_default();
        if entry.last_price <= Decimal::ZERO
            && let Some(ltp) = frame.quotes.get(&entry.instrument_key)
        {
            entry.last_price = *ltp;
        }

        let t = entry.time_to_expiry.unwrap_or_else(|| {
            let expiry_start = entry.expiry_date.and_hms_opt(0, 0, 0).unwrap_or(now);
            let seconds = (expiry_start - now).num_seconds() as f64;
            (seconds / SECONDS_PER_YEAR).max(MIN_TIME_TO_EXPIRY)
        });
        entry.time_to_expiry = Some(t);

        let (Some(spot), Some(strike)) = (frame.spot.to_f64(), entry.strike.to_f64()) else {
            return entry;
        };
        let rate = self.settings.risk_free_rate;

        entry.iv = reported_iv(greeks, entry.iv).unwrap_or_else(|| {
            entry
                .last_price
                .to_f64()
                .and_then(|price| implied_volatility(entry.option_type, price, spot, strike, t, rate).ok())
                .unwrap_or(0.0)
        });

        if let Some(delta) = greeks.delta.filter(|d| d.is_finite()) {
            entry.delta = Some(delta);
        } else if entry.abs_delta().is_none() && strike > 0.0 {
            let sigma = if entry.iv > 0.0 { entry.iv } else { DEFAULT_VOLATILITY };
            entry.delta = Some(bs_delta(entry.option_type, spot, strike, t, rate, sigma));
        }
        entry
    }

    fn can_enter_new_cycle(&self, now: NaiveDateTime, is_expiry_today: bool) -> bool {
        let timing = &self.settings.timing;
        if !self.settings.mode.is_live() || !timing.strict_monthly_expiry_entry || timing.override_timing_checks {
            return true;
        }
        is_expiry_today && timing::is_at_or_after(now, &timing.entry_time)
    }

    /// Opens the adjustment gate on the first tick of each candle.
    fn take_candle(&mut self, now: NaiveDateTime) -> bool {
        if !timing::is_candle_mark(now, self.settings.adjust_interval_minutes) {
            return false;
        }
        let candle = now.date().and_hms_opt(now.hour(), now.minute(), 0);
        if candle.is_none() || self.last_candle == candle {
            return false;
        }
        self.last_candle = candle;
        true
    }
}

fn reported_iv(greeks: GreeksQuote, chain_iv: f64) -> Option<f64> {
    greeks
        .iv
        .filter(|v| v.is_finite() && *v > 0.0)
        .or_else(|| Some(chain_iv).filter(|v| v.is_finite() && *v > 0.0))
}
