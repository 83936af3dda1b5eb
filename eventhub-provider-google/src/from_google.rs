use eventhub_core::normalize::{RawCalendar, RawEvent, RawTime};
use eventhub_core::{Attendee, Organizer};

use crate::types::{CalendarListEntry, EventDateTime, GoogleEvent};

pub fn from_google_calendar(entry: CalendarListEntry) -> RawCalendar {
    let name = entry
        .summary_override
        .filter(|s| !s.is_empty())
        .unwrap_or(entry.summary);

    RawCalendar {
        id: entry.id,
        name: if name.is_empty() {
            "(unnamed)".to_string()
        } else {
            name
        },
        color: entry.background_color,
        is_primary: entry.primary,
    }
}

/// Map a Google event onto the raw form. Date validation happens in the normalizer.
pub fn from_google_event(event: GoogleEvent) -> RawEvent {
    let organizer = event.organizer.map(|o| Organizer {
        email: o.email,
        name: o.display_name.filter(|n| !n.is_empty()),
    });

    let attendees = event
        .attendees
        .into_iter()
        .filter(|a| !a.email.is_empty())
        .map(|a| Attendee {
            email: a.email,
            name: a.display_name.filter(|n| !n.is_empty()),
            status: a.response_status,
        })
        .collect();

    RawEvent {
        id: event.id,
        title: event.summary,
        start: raw_time(event.start.as_ref()),
        end: raw_time(event.end.as_ref()),
        all_day: None,
        location: event.location,
        description: event.description,
        attendees,
        organizer,
        external_link: event.html_link,
        updated: event.updated,
    }
}

pub fn is_cancelled(event: &GoogleEvent) -> bool {
    event.status.as_deref() == Some("cancelled")
}

fn raw_time(time: Option<&EventDateTime>) -> RawTime {
    match time {
        Some(EventDateTime {
            date_time: Some(value),
            time_zone,
            ..
        }) => RawTime::DateTime {
            value: value.clone(),
            time_zone: time_zone.clone(),
        },
        Some(EventDateTime {
            date: Some(date), ..
        }) => RawTime::Date(date.clone()),
        _ => RawTime::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GoogleAttendee, GooglePerson};

    #[test]
    fn all_day_events_keep_their_dates() {
        let event = GoogleEvent {
            id: "abc".into(),
            summary: Some("Holiday".into()),
            start: Some(EventDateTime {
                date: Some("2025-12-25".into()),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date: Some("2025-12-26".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let raw = from_google_event(event);
        assert_eq!(raw.start, RawTime::Date("2025-12-25".into()));
        assert_eq!(raw.end, RawTime::Date("2025-12-26".into()));
    }

    #[test]
    fn people_are_mapped_and_blank_names_dropped() {
        let event = GoogleEvent {
            id: "abc".into(),
            attendees: vec![
                GoogleAttendee {
                    email: "kim@example.com".into(),
                    display_name: Some(String::new()),
                    response_status: Some("accepted".into()),
                },
                GoogleAttendee::default(),
            ],
            organizer: Some(GooglePerson {
                email: "lee@example.com".into(),
                display_name: Some("Lee".into()),
            }),
            ..Default::default()
        };

        let raw = from_google_event(event);
        assert_eq!(raw.attendees.len(), 1);
        assert_eq!(raw.attendees[0].name, None);
        assert_eq!(raw.attendees[0].status.as_deref(), Some("accepted"));
        assert_eq!(raw.organizer.unwrap().name.as_deref(), Some("Lee"));
        assert_eq!(raw.start, RawTime::Missing);
    }

    #[test]
    fn summary_override_names_the_calendar() {
        let raw = from_google_calendar(CalendarListEntry {
            id: "team@group.calendar.google.com".into(),
            summary: "Team".into(),
            summary_override: Some("My team".into()),
            background_color: Some("#7986cb".into()),
            primary: false,
        });
        assert_eq!(raw.name, "My team");
        assert_eq!(raw.color.as_deref(), Some("#7986cb"));
    }
}
