use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use eventhub_core::UnifiedEvent;

use crate::types::{DateTimeTimeZone, EmailAddress, GraphAttendee, GraphEvent, ItemBody, Location};

const GRAPH_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Request body for creating or patching `event`. All-day events must start
/// and end at midnight in the zone they are declared in.
pub fn to_graph_event(event: &UnifiedEvent, timezone: Tz) -> GraphEvent {
    let (start, end) = if event.is_all_day {
        let first = event.start.with_timezone(&timezone).date_naive();
        let last = event.end.with_timezone(&timezone).date_naive() + Duration::days(1);
        (
            DateTimeTimeZone {
                date_time: first.and_time(NaiveTime::MIN).format(GRAPH_DATE_TIME).to_string(),
                time_zone: timezone.name().to_string(),
            },
            DateTimeTimeZone {
                date_time: last.and_time(NaiveTime::MIN).format(GRAPH_DATE_TIME).to_string(),
                time_zone: timezone.name().to_string(),
            },
        )
    } else {
        (utc(event.start), utc(event.end))
    };

    GraphEvent {
        subject: Some(event.title.clone()),
        body: event.description.as_ref().map(|d| ItemBody {
            content_type: "text".to_string(),
            content: d.clone(),
        }),
        start: Some(start),
        end: Some(end),
        is_all_day: Some(event.is_all_day),
        location: event.location.as_ref().map(|l| Location {
            display_name: l.clone(),
        }),
        attendees: event
            .attendees
            .iter()
            .map(|a| GraphAttendee {
                email_address: EmailAddress {
                    address: a.email.clone(),
                    name: a.name.clone(),
                },
                status: None,
                kind: Some("required".to_string()),
            })
            .collect(),
        ..Default::default()
    }
}

fn utc(instant: DateTime<Utc>) -> DateTimeTimeZone {
    DateTimeTimeZone {
        date_time: instant.format(GRAPH_DATE_TIME).to_string(),
        time_zone: "UTC".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventhub_core::{Attendee, Source};

    fn event(all_day: bool) -> UnifiedEvent {
        UnifiedEvent {
            id: "AAMk1".into(),
            title: "Planning".into(),
            start: Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 59).unwrap(),
            is_all_day: all_day,
            location: Some("Room 4".into()),
            description: Some("Quarterly goals".into()),
            attendees: vec![Attendee {
                email: "kim@example.com".into(),
                name: None,
                status: Some("accepted".into()),
            }],
            organizer: None,
            calendar_id: "AAMkCal".into(),
            calendar_name: "Team".into(),
            calendar_color: "#0078d4".into(),
            source: Source::Microsoft,
            external_link: None,
            source_updated_at: None,
        }
    }

    #[test]
    fn all_day_events_span_midnight_to_midnight() {
        let body = to_graph_event(&event(true), Tz::UTC);
        assert_eq!(body.start.unwrap().date_time, "2025-03-10T00:00:00");
        assert_eq!(body.end.unwrap().date_time, "2025-03-11T00:00:00");
    }

    #[test]
    fn body_omits_read_only_fields() {
        let json = serde_json::to_value(to_graph_event(&event(false), Tz::UTC)).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("webLink").is_none());
        assert!(json["attendees"][0].get("status").is_none());
        assert_eq!(json["attendees"][0]["type"], "required");
        assert_eq!(json["start"]["dateTime"], "2025-03-10T00:00:00");
        assert_eq!(json["body"]["contentType"], "text");
        assert_eq!(json["location"]["displayName"], "Room 4");
    }
}
