//! Parsing of user-entered dates, times and durations.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use eventhub_core::date_range::{end_of_day, localize, start_of_day};

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// A point in the user's calendar: a whole day or a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum When {
    Day(NaiveDate),
    At(NaiveDateTime),
}

impl When {
    pub fn is_day(&self) -> bool {
        matches!(self, When::Day(_))
    }

    pub fn start(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            When::Day(d) => start_of_day(*d, tz),
            When::At(dt) => localize(*dt, tz),
        }
    }

    /// Inclusive end: the last second of a day, or the instant itself.
    pub fn end(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            When::Day(d) => end_of_day(*d, tz),
            When::At(dt) => localize(*dt, tz),
        }
    }

    pub fn plus(&self, duration: Duration) -> When {
        match self {
            When::Day(d) => When::Day(*d + duration),
            When::At(dt) => When::At(*dt + duration),
        }
    }

    /// One hour after a time; the same day for a whole-day event.
    pub fn default_end(&self) -> When {
        match self {
            When::Day(d) => When::Day(*d),
            When::At(dt) => When::At(*dt + Duration::hours(1)),
        }
    }
}

/// Accepts ISO dates and date-times, falling back to natural language
/// ("tomorrow 3pm", "fri"). Input without a time component is a whole day.
pub fn parse_when(input: &str) -> Result<When> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(When::Day(date));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(When::At(dt));
        }
    }

    let dt = fuzzydate::parse(input)
        .map_err(|_| anyhow::anyhow!("Could not parse date/time: \"{}\"", input))?;
    if has_time(input) {
        Ok(When::At(dt))
    } else {
        Ok(When::Day(dt.date()))
    }
}

/// Human duration such as "30m" or "2h30m".
pub fn parse_duration(input: &str) -> Result<Duration> {
    let std = humantime::parse_duration(input.trim())
        .with_context(|| format!("Could not parse duration: \"{}\"", input))?;
    Duration::from_std(std).context("Duration too large")
}

fn has_time(input: &str) -> bool {
    let lower = input.to_lowercase();
    if lower.contains("noon") || lower.contains("midnight") {
        return true;
    }

    let words: Vec<&str> = lower.split_whitespace().collect();
    words.iter().enumerate().any(|(i, word)| {
        let digits_then = |suffix: &str| {
            word.strip_suffix(suffix)
                .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
        };
        let clock = word
            .split_once(':')
            .is_some_and(|(h, m)| !h.is_empty() && !m.is_empty() && h.chars().all(|c| c.is_ascii_digit()));
        let spaced_meridiem = (*word == "am" || *word == "pm")
            && i > 0
            && words[i - 1].chars().all(|c| c.is_ascii_digit());
        let at_hour = *word == "at"
            && words
                .get(i + 1)
                .is_some_and(|next| next.starts_with(|c: char| c.is_ascii_digit()));

        digits_then("am") || digits_then("pm") || clock || spaced_meridiem || at_hour
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32) -> When {
        When::At(NaiveDate::from_ymd_opt(2025, 3, d).unwrap().and_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn iso_inputs() {
        assert_eq!(
            parse_when("2025-03-20").unwrap(),
            When::Day(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap())
        );
        assert_eq!(parse_when("2025-03-20T15:00").unwrap(), at(20, 15, 0));
        assert_eq!(parse_when(" 2025-03-20 09:30 ").unwrap(), at(20, 9, 30));
    }

    #[test]
    fn natural_language_without_time_is_a_day() {
        assert!(parse_when("tomorrow").unwrap().is_day());
        assert!(!parse_when("tomorrow 3pm").unwrap().is_day());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_when("not a date at all xyz").is_err());
    }

    #[test]
    fn time_detection() {
        assert!(has_time("friday 11am"));
        assert!(has_time("sat 3 pm"));
        assert!(has_time("march 20 9:30"));
        assert!(has_time("tomorrow at 3"));
        assert!(has_time("tomorrow noon"));
        assert!(!has_time("next friday"));
        assert!(!has_time("december"));
        assert!(!has_time("camp"));
    }

    #[test]
    fn durations_and_defaults() {
        let start = at(20, 15, 0);
        assert_eq!(start.plus(parse_duration("45m").unwrap()), at(20, 15, 45));
        assert_eq!(start.default_end(), at(20, 16, 0));
        assert!(parse_duration("soon").is_err());

        let day = When::Day(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());
        assert_eq!(day.default_end(), day);
        assert_eq!(
            day.end(Tz::UTC).to_rfc3339(),
            "2025-03-20T23:59:59+00:00"
        );
    }
}
