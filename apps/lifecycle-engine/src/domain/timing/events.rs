//! Upcoming market events: scheduled macro announcements and exchange holidays.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::HolidayCalendar;

/// A scheduled announcement that tends to gap the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicEvent {
    /// Announcement date.
    pub date: NaiveDate,
    /// Description, e.g. "RBI MPC Policy Announcement".
    pub name: String,
}

/// One warning about a date inside the lookahead window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventWarning {
    /// The exchange is closed.
    Holiday {
        /// Holiday date.
        date: NaiveDate,
        /// Calendar days from today.
        days_ahead: i64,
    },
    /// A scheduled economic event.
    Event {
        /// Event date.
        date: NaiveDate,
        /// Event description.
        name: String,
        /// Calendar days from today.
        days_ahead: i64,
    },
}

impl EventWarning {
    /// Date the warning refers to.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Holiday { date, .. } | Self::Event { date, .. } => *date,
        }
    }
}

fn when(days_ahead: i64) -> String {
    if days_ahead == 0 {
        "today".to_string()
    } else {
        format!("in {days_ahead} days")
    }
}

impl fmt::Display for EventWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holiday { date, days_ahead } => {
                write!(f, "Market holiday {date} {}; exchange closed", when(*days_ahead))
            }
            Self::Event {
                date,
                name,
                days_ahead,
            } => write!(f, "{name} on {date} {}; expect gaps or volatility", when(*days_ahead)),
        }
    }
}

/// Holidays and events from `today` through `today + lookahead_days`,
/// ordered by date with holidays first on a shared date.
#[must_use]
pub fn upcoming_warnings(
    events: &[EconomicEvent],
    calendar: &HolidayCalendar,
    today: NaiveDate,
    lookahead_days: u32,
) -> Vec<EventWarning> {
    let horizon = today + Duration::days(i64::from(lookahead_days));
    let in_window = |date: NaiveDate| date >= today && date <= horizon;

    let mut warnings: Vec<EventWarning> = today
        .iter_days()
        .take_while(|date| *date <= horizon)
        .filter(|date| calendar.is_holiday(*date))
        .map(|date| EventWarning::Holiday {
            date,
            days_ahead: (date - today).num_days(),
        })
        .collect();
    warnings.extend(events.iter().filter(|event| in_window(event.date)).map(|event| {
        EventWarning::Event {
            date: event.date,
            name: event.name.clone(),
            days_ahead: (event.date - today).num_days(),
        }
    }));
    // Stable sort keeps holidays ahead of events on the same date.
    warnings.sort_by_key(EventWarning::date);
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn event(date: NaiveDate, name: &str) -> EconomicEvent {
        EconomicEvent {
            date,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_window_includes_today_and_horizon() {
        let events = [
            event(d(2, 1), "Union Budget"),
            event(d(2, 6), "RBI MPC Policy Announcement"),
            event(d(2, 7), "Too far"),
            event(d(1, 31), "Already past"),
        ];

        let warnings = upcoming_warnings(&events, &HolidayCalendar::default(), d(2, 1), 5);

        let names: Vec<String> = warnings
            .iter()
            .filter_map(|w| match w {
                EventWarning::Event { name, .. } => Some(name.clone()),
                EventWarning::Holiday { .. } => None,
            })
            .collect();
        assert_eq!(names, vec!["Union Budget", "RBI MPC Policy Announcement"]);
        assert_eq!(warnings[1].to_string(), "RBI MPC Policy Announcement on 2026-02-06 in 5 days; expect gaps or volatility");
    }

    #[test]
    fn test_holidays_are_reported_before_events() {
        let calendar = HolidayCalendar::new([d(3, 24)]);
        let events = [event(d(3, 24), "US FOMC Rate Decision")];

        let warnings = upcoming_warnings(&events, &calendar, d(3, 24), 0);

        assert_eq!(
            warnings,
            vec![
                EventWarning::Holiday {
                    date: d(3, 24),
                    days_ahead: 0
                },
                EventWarning::Event {
                    date: d(3, 24),
                    name: "US FOMC Rate Decision".to_string(),
                    days_ahead: 0
                },
            ]
        );
        assert_eq!(warnings[0].to_string(), "Market holiday 2026-03-24 today; exchange closed");
    }

    #[test]
    fn test_quiet_week_has_no_warnings() {
        assert!(upcoming_warnings(&[], &HolidayCalendar::default(), d(3, 2), 5).is_empty());
    }
}
