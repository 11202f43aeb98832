//! Timing Gate
//!
//! Holiday-aware calendar arithmetic and the time-of-day predicates that
//! gate entry, adjustment, rollover and exit. Times of day are compared as
//! zero-padded `HH:MM` strings, for which lexicographic order equals
//! chronological order.

mod calendar;
mod events;

pub use calendar::HolidayCalendar;
pub use events::{EconomicEvent, EventWarning, upcoming_warnings};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Format a timestamp as `HH:MM`.
#[must_use]
pub fn hhmm(now: NaiveDateTime) -> String {
    now.format("%H:%M").to_string()
}

/// Whether `now` is at or after the `HH:MM` mark.
#[must_use]
pub fn is_at_or_after(now: NaiveDateTime, mark: &str) -> bool {
    hhmm(now).as_str() >= mark
}

/// Whether `now` is strictly before the `HH:MM` mark.
#[must_use]
pub fn is_before(now: NaiveDateTime, mark: &str) -> bool {
    !is_at_or_after(now, mark)
}

/// Whether the next trading day after `today` is `expiry`.
#[must_use]
pub fn is_day_before(calendar: &HolidayCalendar, today: NaiveDate, expiry: NaiveDate) -> bool {
    calendar.next_trading_day(today) == expiry
}

/// Whether `now` falls inside an entry window on `weekday`.
///
/// The window opens at `start` and, when `end` is given, closes strictly
/// before it. `override_timing` opens the window unconditionally.
#[must_use]
pub fn is_entry_window(
    now: NaiveDateTime,
    weekday: Weekday,
    start: &str,
    end: Option<&str>,
    override_timing: bool,
) -> bool {
    if override_timing {
        return true;
    }
    now.weekday() == weekday && is_at_or_after(now, start) && end.is_none_or(|e| is_before(now, e))
}

/// Whether `now` is inside the post-open gap window (both ends inclusive).
#[must_use]
pub fn is_gap_window(now: NaiveDateTime, market_open: &str, window_minutes: u32) -> bool {
    let Ok(open) = NaiveTime::parse_from_str(market_open, "%H:%M") else {
        return false;
    };
    let close = open + Duration::minutes(i64::from(window_minutes));
    let current = now.time().with_second(0).and_then(|t| t.with_nanosecond(0));
    current.is_some_and(|t| t >= open && t <= close)
}

/// Whether `now` is inside `[open, close]`.
#[must_use]
pub fn is_market_hours(now: NaiveDateTime, open: &str, close: &str) -> bool {
    let current = hhmm(now);
    current.as_str() >= open && current.as_str() <= close
}

/// Whether `now` sits on an adjustment candle boundary.
#[must_use]
pub fn is_candle_mark(now: NaiveDateTime, interval_minutes: u32) -> bool {
    interval_minutes != 0 && now.minute() % interval_minutes == 0
}
