use eventhub_core::normalize::{RawCalendar, RawEvent, RawTime};
use eventhub_core::{Attendee, Organizer};

use crate::types::{DateTimeTimeZone, GraphCalendar, GraphEvent};

pub fn from_graph_calendar(calendar: GraphCalendar) -> RawCalendar {
    RawCalendar {
        id: calendar.id,
        name: calendar.name,
        color: calendar.hex_color.filter(|c| !c.is_empty()),
        is_primary: calendar.is_default_calendar,
    }
}

/// Graph sends every bound as a date-time; all-day events are flagged and
/// span midnight to midnight.
pub fn from_graph_event(event: GraphEvent) -> RawEvent {
    let attendees = event
        .attendees
        .into_iter()
        .filter(|a| !a.email_address.address.is_empty())
        .map(|a| Attendee {
            email: a.email_address.address,
            name: a.email_address.name.filter(|n| !n.is_empty()),
            status: a
                .status
                .and_then(|s| s.response)
                .filter(|r| !r.is_empty() && r != "none"),
        })
        .collect();

    let organizer = event
        .organizer
        .filter(|o| !o.email_address.address.is_empty())
        .map(|o| Organizer {
            email: o.email_address.address,
            name: o.email_address.name.filter(|n| !n.is_empty()),
        });

    RawEvent {
        id: event.id,
        title: event.subject,
        start: raw_time(event.start),
        end: raw_time(event.end),
        all_day: event.is_all_day,
        location: event
            .location
            .map(|l| l.display_name)
            .filter(|l| !l.is_empty()),
        description: event
            .body_preview
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        attendees,
        organizer,
        external_link: event.web_link,
        updated: event.last_modified_date_time,
    }
}

fn raw_time(time: Option<DateTimeTimeZone>) -> RawTime {
    match time {
        Some(t) if !t.date_time.is_empty() => RawTime::DateTime {
            value: t.date_time,
            time_zone: Some(t.time_zone).filter(|z| !z.is_empty()),
        },
        _ => RawTime::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmailAddress, GraphAttendee, Location, ResponseStatus};

    #[test]
    fn graph_event_maps_onto_raw_form() {
        let event = GraphEvent {
            id: "AAMkAD=".into(),
            subject: Some("Review".into()),
            body_preview: Some("  Agenda attached \r\n".into()),
            start: Some(DateTimeTimeZone {
                date_time: "2025-03-12T10:00:00.0000000".into(),
                time_zone: "UTC".into(),
            }),
            end: None,
            is_all_day: Some(false),
            location: Some(Location::default()),
            attendees: vec![GraphAttendee {
                email_address: EmailAddress {
                    address: "kim@example.com".into(),
                    name: Some("Kim".into()),
                },
                status: Some(ResponseStatus {
                    response: Some("none".into()),
                }),
                kind: Some("required".into()),
            }],
            ..Default::default()
        };

        let raw = from_graph_event(event);
        assert_eq!(raw.description.as_deref(), Some("Agenda attached"));
        assert_eq!(raw.location, None);
        assert_eq!(raw.end, RawTime::Missing);
        assert_eq!(raw.all_day, Some(false));
        assert_eq!(raw.attendees[0].status, None);
        assert_eq!(
            raw.start,
            RawTime::DateTime {
                value: "2025-03-12T10:00:00.0000000".into(),
                time_zone: Some("UTC".into()),
            }
        );
    }

    #[test]
    fn calendars_without_hex_colour_fall_back() {
        let raw = from_graph_calendar(GraphCalendar {
            id: "AAMkCal".into(),
            name: "Calendar".into(),
            hex_color: Some(String::new()),
            is_default_calendar: true,
        });
        assert_eq!(raw.color, None);
        assert!(raw.is_primary);
    }
}
