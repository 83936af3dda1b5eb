//! Conversion of provider payloads into `UnifiedEvent`s.
//!
//! Adapters map their API responses onto `RawCalendar`/`RawEvent`, which keep
//! dates as the provider sent them. The normalizer owns every rule that must
//! hold the same way for all providers: date parsing, the epoch-sentinel
//! check, all-day end handling and the birthday filter.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{GOOGLE_BIRTHDAY_CALENDAR_ID, UNTITLED_EVENT};
use crate::date_range::{end_of_day, localize, start_of_day};
use crate::error::{EventHubError, EventHubResult};
use crate::event::{Attendee, Organizer, Source, UnifiedCalendar, UnifiedEvent};

/// A calendar as listed by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCalendar {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
}

/// A start or end value as the provider sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawTime {
    /// Date-only value (YYYY-MM-DD) of an all-day event
    Date(String),
    /// Date-time value, with the zone the provider declared for it
    DateTime {
        value: String,
        time_zone: Option<String>,
    },
    Missing,
}

/// An event as fetched from a provider, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub title: Option<String>,
    pub start: RawTime,
    pub end: RawTime,
    /// Explicit all-day flag for providers that send date-times for all-day events
    pub all_day: Option<bool>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Organizer>,
    pub external_link: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// Instants that broken date construction in common libraries collapses to.
const DATE_SENTINELS: [(i32, u32, u32); 2] = [(1970, 1, 1), (2018, 12, 23)];

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Zone used for all-day events and offset-less times without a usable zone
    pub timezone: Tz,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer { timezone: Tz::UTC }
    }
}

/// Outcome of normalizing every event of one calendar
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub events: Vec<UnifiedEvent>,
    /// Events skipped because their dates failed validation
    pub rejected: Vec<(String, EventHubError)>,
    /// Events dropped by the birthday filter
    pub filtered: usize,
}

impl Normalizer {
    pub fn new(timezone: Tz) -> Self {
        Normalizer { timezone }
    }

    pub fn calendar(&self, raw: &RawCalendar, source: Source) -> UnifiedCalendar {
        UnifiedCalendar {
            id: raw.id.clone(),
            name: raw.name.clone(),
            color: raw
                .color
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| source.default_color().to_string()),
            source,
            is_primary: raw.is_primary,
        }
    }

    /// Convert one raw event. Fails with `Validation` when its dates cannot be trusted.
    pub fn normalize(
        &self,
        raw: &RawEvent,
        calendar: &UnifiedCalendar,
    ) -> EventHubResult<UnifiedEvent> {
        let is_all_day = raw
            .all_day
            .unwrap_or_else(|| matches!(raw.start, RawTime::Date(_)));

        let (start, end) = if is_all_day {
            let first = self.parse_date(&raw.start, "start")?;
            let last = self.parse_date(&raw.end, "end")?;
            // Providers send the day after the last day; a same-day end is taken as-is
            let last = if last > first { last - Duration::days(1) } else { last };
            (
                start_of_day(first, self.timezone),
                end_of_day(last, self.timezone),
            )
        } else {
            (
                self.parse_instant(&raw.start, "start")?,
                self.parse_instant(&raw.end, "end")?,
            )
        };

        validate_instant(start, "start")?;
        validate_instant(end, "end")?;
        if end < start {
            return Err(EventHubError::Validation(format!(
                "end {} is before start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }

        Ok(UnifiedEvent {
            id: raw.id.clone(),
            title: raw
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            start,
            end,
            is_all_day,
            location: raw.location.clone().filter(|l| !l.is_empty()),
            description: raw.description.clone().filter(|d| !d.is_empty()),
            attendees: raw.attendees.clone(),
            organizer: raw.organizer.clone(),
            calendar_id: calendar.id.clone(),
            calendar_name: calendar.name.clone(),
            calendar_color: calendar.color.clone(),
            source: calendar.source,
            external_link: raw.external_link.clone(),
            source_updated_at: raw.updated,
        })
    }

    /// Normalize every event of a calendar, skipping invalid ones and applying the birthday filter.
    pub fn normalize_all(&self, raw: &[RawEvent], calendar: &UnifiedCalendar) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for event in raw {
            match self.normalize(event, calendar) {
                Ok(unified) if is_birthday(&unified, calendar) => batch.filtered += 1,
                Ok(unified) => batch.events.push(unified),
                Err(e) => {
                    warn!(
                        calendar = %calendar.name,
                        event = %event.id,
                        error = %e,
                        "Skipping event with invalid dates"
                    );
                    batch.rejected.push((event.id.clone(), e));
                }
            }
        }

        batch
    }

    fn parse_date(&self, time: &RawTime, which: &str) -> EventHubResult<NaiveDate> {
        match time {
            RawTime::Date(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| invalid(which, s)),
            // All-day flag on a date-time value: the calendar date is what counts
            RawTime::DateTime { value, .. } => value
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .ok_or_else(|| invalid(which, value)),
            RawTime::Missing => Err(EventHubError::Validation(format!("event has no {which}"))),
        }
    }

    fn parse_instant(&self, time: &RawTime, which: &str) -> EventHubResult<DateTime<Utc>> {
        match time {
            RawTime::DateTime { value, time_zone } => {
                let value = value.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
                    return Ok(dt.with_timezone(&Utc));
                }
                let naive = parse_naive(value).ok_or_else(|| invalid(which, value))?;
                let tz = time_zone
                    .as_deref()
                    .and_then(|name| name.parse::<Tz>().ok())
                    .unwrap_or(self.timezone);
                Ok(localize(naive, tz))
            }
            // Timed event with a date-only bound: midnight in the user's zone
            RawTime::Date(_) => Ok(start_of_day(self.parse_date(time, which)?, self.timezone)),
            RawTime::Missing => Err(EventHubError::Validation(format!("event has no {which}"))),
        }
    }
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    // Graph sends seven fractional digits, which %.f accepts
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}

fn invalid(which: &str, value: &str) -> EventHubError {
    EventHubError::Validation(format!("unparseable {which} '{value}'"))
}

/// Reject instants within 24 hours of a known fallback sentinel.
pub fn validate_instant(instant: DateTime<Utc>, which: &str) -> EventHubResult<()> {
    for (y, m, d) in DATE_SENTINELS {
        let Some(sentinel) = Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single() else {
            continue;
        };
        if (instant - sentinel).num_seconds().abs() < Duration::hours(24).num_seconds() {
            return Err(EventHubError::Validation(format!(
                "{which} {} matches fallback date {sentinel}",
                instant.to_rfc3339()
            )));
        }
    }
    Ok(())
}

/// Birthday entries are dropped only when they live on a dedicated birthday calendar.
pub fn is_birthday(event: &UnifiedEvent, calendar: &UnifiedCalendar) -> bool {
    let title = event.title.to_lowercase();
    let birthday_calendar = calendar.name.to_lowercase().contains("birthday")
        || calendar.id == GOOGLE_BIRTHDAY_CALENDAR_ID;

    title.contains("birthday") && birthday_calendar
}
