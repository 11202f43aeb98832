//! Holiday calendar fetch.
//!
//! The exchange publishes its holiday list as
//! `{"status": "success", "data": [{"holiday_date": "YYYY-MM-DD", ...}]}`.
//! Fetched dates are merged into the configured list; if the fetch fails the
//! configured list is used alone.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::config::TimingConfig;
use crate::domain::timing::HolidayCalendar;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Holiday fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// Request failed or timed out.
    #[error("Holiday request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("Holiday endpoint returned {status}")]
    Status {
        /// HTTP status or envelope status.
        status: String,
    },
}

#[derive(Debug, Deserialize)]
struct HolidayResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Vec<HolidayEntry>,
}

#[derive(Debug, Deserialize)]
struct HolidayEntry {
    #[serde(default)]
    holiday_date: Option<String>,
}

/// Fetch the published holiday dates from `url`.
pub async fn fetch_holidays(url: &str) -> Result<Vec<NaiveDate>, CalendarError> {
    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(CalendarError::Status {
            status: response.status().as_u16().to_string(),
        });
    }

    let body: HolidayResponse = response.json().await?;
    if !body.status.eq_ignore_ascii_case("success") {
        return Err(CalendarError::Status { status: body.status });
    }

    Ok(body
        .data
        .iter()
        .filter_map(|entry| entry.holiday_date.as_deref())
        .filter_map(|text| NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok())
        .collect())
}

/// Build the calendar from config, adding fetched dates when an endpoint
/// is configured and reachable.
pub async fn load_calendar(timing: &TimingConfig) -> HolidayCalendar {
    let mut calendar = HolidayCalendar::new(timing.holidays.iter().copied());
    let Some(url) = timing.holiday_api_url.as_deref() else {
        return calendar;
    };

    match fetch_holidays(url).await {
        Ok(dates) => {
            tracing::info!(fetched = dates.len(), "Holiday calendar fetched");
            calendar.extend(dates);
        }
        Err(e) => {
            tracing::warn!(error = %e, configured = calendar.len(), "Holiday fetch failed; using configured list");
        }
    }
    calendar
}
