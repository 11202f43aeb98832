//! Exchange holiday calendar.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

/// Trading-day arithmetic over weekends and a holiday list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Build a calendar from a holiday list.
    #[must_use]
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Merge additional holidays.
    pub fn extend(&mut self, holidays: impl IntoIterator<Item = NaiveDate>) {
        self.holidays.extend(holidays);
    }

    /// Number of known holidays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    /// Check if no holidays are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    /// Check if `date` is a listed holiday.
    #[must_use]
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Check if the exchange trades on `date`.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// First trading day strictly after `date`.
    #[must_use]
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut next = date;
        loop {
            next = match next.succ_opt() {
                Some(d) => d,
                None => return next,
            };
            if self.is_trading_day(next) {
                return next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_next_trading_day_skips_holiday() {
        // Thu 2026-01-22 -> Fri 2026-01-23 holiday -> Mon 2026-01-26 holiday -> Tue 27
        let calendar = HolidayCalendar::new([
            NaiveDate::from_ymd_opt(2026, 1, 23).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 26).unwrap(),
        ]);
        let thursday = NaiveDate::from_ymd_opt(2026, 1, 22).unwrap();
        assert_eq!(
            calendar.next_trading_day(thursday),
            NaiveDate::from_ymd_opt(2026, 1, 27).unwrap()
        );
        assert!(!calendar.is_trading_day(NaiveDate::from_ymd_opt(2026, 1, 24).unwrap()));
    }

    proptest! {
        #[test]
        fn prop_next_trading_day_is_tradable(offset in 0i64..730, holiday_offsets in proptest::collection::vec(0i64..730, 0..40)) {
            let base = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
            let calendar = HolidayCalendar::new(
                holiday_offsets.iter().map(|d| base + chrono::Duration::days(*d)),
            );
            let start = base + chrono::Duration::days(offset);
            let next = calendar.next_trading_day(start);
            prop_assert!(next > start);
            prop_assert!(calendar.is_trading_day(next));
        }
    }
}
