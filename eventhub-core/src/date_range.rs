//! Time windows used to bound provider fetches and searches.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::constants::{DEFAULT_WINDOW_FUTURE_DAYS, DEFAULT_WINDOW_PAST_DAYS};

/// The span of time fetched from every provider during one sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Default for SyncWindow {
    /// Default window: DEFAULT_WINDOW_PAST_DAYS back, DEFAULT_WINDOW_FUTURE_DAYS ahead
    fn default() -> Self {
        SyncWindow::around(Utc::now(), DEFAULT_WINDOW_PAST_DAYS, DEFAULT_WINDOW_FUTURE_DAYS)
    }
}

impl SyncWindow {
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        SyncWindow {
            from: now - Duration::days(past_days),
            to: now + Duration::days(future_days),
        }
    }

    pub fn from_rfc3339(&self) -> String {
        self.from.to_rfc3339()
    }

    pub fn to_rfc3339(&self) -> String {
        self.to.to_rfc3339()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

/// Date range for filtering events.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Parse YYYY-MM-DD bounds. `from` starts at 00:00:00, `to` ends at 23:59:59.
    pub fn from_args(from: Option<&str>, to: Option<&str>, tz: Tz) -> Result<Self, String> {
        let from = from.map(|s| parse_date(s).map(|d| start_of_day(d, tz))).transpose()?;
        let to = to.map(|s| parse_date(s).map(|d| end_of_day(d, tz))).transpose()?;
        Ok(DateRange { from, to })
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Quick ranges relative to "today" in the user's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRangePreset {
    Today,
    Tomorrow,
    ThisWeek,
    NextWeek,
    ThisMonth,
    NextMonth,
}

impl std::str::FromStr for DateRangePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "today" => Ok(DateRangePreset::Today),
            "tomorrow" => Ok(DateRangePreset::Tomorrow),
            "thisweek" => Ok(DateRangePreset::ThisWeek),
            "nextweek" => Ok(DateRangePreset::NextWeek),
            "thismonth" => Ok(DateRangePreset::ThisMonth),
            "nextmonth" => Ok(DateRangePreset::NextMonth),
            _ => Err(format!(
                "Unknown range '{s}'. Expected today, tomorrow, this-week, next-week, this-month or next-month"
            )),
        }
    }
}

impl DateRangePreset {
    /// Resolve the preset against `today`. Weeks start on Sunday.
    pub fn resolve(&self, today: NaiveDate, tz: Tz) -> DateRange {
        let (first, last) = match self {
            DateRangePreset::Today => (today, today),
            DateRangePreset::Tomorrow => {
                let tomorrow = today + Duration::days(1);
                (tomorrow, tomorrow)
            }
            DateRangePreset::ThisWeek | DateRangePreset::NextWeek => {
                let offset = today.weekday().num_days_from_sunday() as i64;
                let mut start = today - Duration::days(offset);
                if *self == DateRangePreset::NextWeek {
                    start += Duration::days(7);
                }
                (start, start + Duration::days(6))
            }
            DateRangePreset::ThisMonth => month_bounds(today.year(), today.month()),
            DateRangePreset::NextMonth => {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                month_bounds(year, month)
            }
        };

        DateRange {
            from: Some(start_of_day(first, tz)),
            to: Some(end_of_day(last, tz)),
        }
    }
}

fn month_bounds(year: i32, month: u32) -> (NaiveDate, NaiveDate) {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default();
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap_or_default();
    (first, next_first - Duration::days(1))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}

/// 00:00:00 of `date` in `tz`, as UTC
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    localize(naive, tz)
}

/// 23:59:59 of `date` in `tz`, as UTC
pub fn end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(23, 59, 59).unwrap_or_default();
    localize(naive, tz)
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier instant,
/// times skipped by a DST jump are read as UTC offsets of the zone's standard time.
pub fn localize(naive: chrono::NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc())
        }
    }
}
