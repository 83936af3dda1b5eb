//! Filtering over a projected event list.

use std::collections::BTreeMap;

use crate::date_range::DateRange;
use crate::event::{Source, UnifiedEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Case-insensitive text matched against title, description, location,
    /// organizer and attendees
    pub query: String,
    pub range: DateRange,
    /// Calendar ids; empty means all
    pub calendars: Vec<String>,
    /// Sources; empty means all
    pub sources: Vec<Source>,
    /// `Some(true)` keeps only all-day events, `Some(false)` only timed ones
    pub all_day: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub total: usize,
    pub filtered: usize,
    pub by_source: BTreeMap<Source, usize>,
    pub by_calendar: BTreeMap<String, usize>,
}

impl SearchFilters {
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
            || !self.range.is_unbounded()
            || !self.calendars.is_empty()
            || !self.sources.is_empty()
            || self.all_day.is_some()
    }

    pub fn matches(&self, event: &UnifiedEvent) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() && !searchable_text(event).contains(&query) {
            return false;
        }

        // Events must lie entirely inside the range
        if self.range.from.is_some_and(|from| event.start < from) {
            return false;
        }
        if self.range.to.is_some_and(|to| event.end > to) {
            return false;
        }

        if !self.calendars.is_empty() && !self.calendars.contains(&event.calendar_id) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.contains(&event.source) {
            return false;
        }

        self.all_day.is_none_or(|all_day| event.is_all_day == all_day)
    }

    pub fn apply<'a, I>(&self, events: I) -> Vec<&'a UnifiedEvent>
    where
        I: IntoIterator<Item = &'a UnifiedEvent>,
    {
        events.into_iter().filter(|e| self.matches(e)).collect()
    }
}

fn searchable_text(event: &UnifiedEvent) -> String {
    let mut parts: Vec<&str> = vec![event.title.as_str()];
    parts.extend(event.description.as_deref());
    parts.extend(event.location.as_deref());
    if let Some(organizer) = &event.organizer {
        parts.extend(organizer.name.as_deref());
        parts.push(&organizer.email);
    }
    for attendee in &event.attendees {
        parts.push(attendee.name.as_deref().unwrap_or(&attendee.email));
    }
    parts.join(" ").to_lowercase()
}

impl SearchStats {
    pub fn compute(total: usize, filtered: &[&UnifiedEvent]) -> Self {
        let mut stats = SearchStats {
            total,
            filtered: filtered.len(),
            ..Default::default()
        };
        for event in filtered {
            *stats.by_source.entry(event.source).or_default() += 1;
            *stats.by_calendar.entry(event.calendar_id.clone()).or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attendee, Organizer};
    use chrono::{TimeZone, Utc};

    fn event(id: &str, source: Source, calendar: &str, all_day: bool) -> UnifiedEvent {
        UnifiedEvent {
            id: id.to_string(),
            title: format!("Event {id}"),
            start: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
            is_all_day: all_day,
            location: Some("Berlin office".into()),
            description: None,
            attendees: vec![Attendee {
                email: "kim@example.com".into(),
                name: Some("Kim Lee".into()),
                status: None,
            }],
            organizer: Some(Organizer {
                email: "boss@example.com".into(),
                name: None,
            }),
            calendar_id: calendar.to_string(),
            calendar_name: calendar.to_string(),
            calendar_color: "#000000".into(),
            source,
            external_link: None,
            source_updated_at: None,
        }
    }

    #[test]
    fn text_query_covers_location_organizer_and_attendees() {
        let e = event("1", Source::Google, "work", false);
        for query in ["berlin", "KIM LEE", "boss@example", "event 1"] {
            let filters = SearchFilters {
                query: query.into(),
                ..Default::default()
            };
            assert!(filters.matches(&e), "query {query}");
        }
        let filters = SearchFilters {
            query: "paris".into(),
            ..Default::default()
        };
        assert!(!filters.matches(&e));
    }

    #[test]
    fn range_requires_full_containment() {
        let e = event("1", Source::Google, "work", false);
        let filters = SearchFilters {
            range: DateRange {
                from: Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()),
                to: None,
            },
            ..Default::default()
        };
        assert!(!filters.matches(&e));
    }

    #[test]
    fn stats_count_filtered_events() {
        let events = vec![
            event("1", Source::Google, "work", false),
            event("2", Source::Microsoft, "team", true),
            event("3", Source::Google, "work", true),
        ];
        let filters = SearchFilters {
            all_day: Some(true),
            ..Default::default()
        };
        assert!(filters.is_active());

        let filtered = filters.apply(&events);
        let stats = SearchStats::compute(events.len(), &filtered);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.filtered, 2);
        assert_eq!(stats.by_source[&Source::Google], 1);
        assert_eq!(stats.by_source[&Source::Microsoft], 1);
        assert_eq!(stats.by_calendar["team"], 1);
    }

    #[test]
    fn empty_filters_match_everything() {
        let filters = SearchFilters::default();
        assert!(!filters.is_active());
        assert!(filters.matches(&event("1", Source::Microsoft, "x", true)));
    }
}
