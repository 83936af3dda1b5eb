use chrono::Duration;
use chrono_tz::Tz;
use eventhub_core::UnifiedEvent;

use crate::types::{EventDateTime, GoogleAttendee, GoogleEvent, GooglePerson};

/// Request body for inserting or replacing `event`. All-day events are sent
/// as dates in `timezone`, with Google's exclusive end date.
pub fn to_google_event(event: &UnifiedEvent, timezone: Tz) -> GoogleEvent {
    let (start, end) = if event.is_all_day {
        let first = event.start.with_timezone(&timezone).date_naive();
        let last = event.end.with_timezone(&timezone).date_naive();
        (
            EventDateTime {
                date: Some(first.format("%Y-%m-%d").to_string()),
                ..Default::default()
            },
            EventDateTime {
                date: Some((last + Duration::days(1)).format("%Y-%m-%d").to_string()),
                ..Default::default()
            },
        )
    } else {
        (
            EventDateTime {
                date_time: Some(event.start.to_rfc3339()),
                time_zone: Some("UTC".to_string()),
                ..Default::default()
            },
            EventDateTime {
                date_time: Some(event.end.to_rfc3339()),
                time_zone: Some("UTC".to_string()),
                ..Default::default()
            },
        )
    };

    GoogleEvent {
        // Google assigns ids on insert
        id: String::new(),
        status: None,
        summary: Some(event.title.clone()),
        description: event.description.clone(),
        location: event.location.clone(),
        start: Some(start),
        end: Some(end),
        attendees: event
            .attendees
            .iter()
            .map(|a| GoogleAttendee {
                email: a.email.clone(),
                display_name: a.name.clone(),
                response_status: a.status.clone(),
            })
            .collect(),
        organizer: event.organizer.as_ref().map(|o| GooglePerson {
            email: o.email.clone(),
            display_name: o.name.clone(),
        }),
        html_link: None,
        updated: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use eventhub_core::Source;

    fn event(all_day: bool) -> UnifiedEvent {
        UnifiedEvent {
            id: "local_1".into(),
            title: "Offsite".into(),
            start: Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 11, 22, 59, 59).unwrap(),
            is_all_day: all_day,
            location: None,
            description: None,
            attendees: vec![],
            organizer: None,
            calendar_id: "primary".into(),
            calendar_name: "Work".into(),
            calendar_color: "#4285f4".into(),
            source: Source::Google,
            external_link: None,
            source_updated_at: None,
        }
    }

    #[test]
    fn all_day_end_is_exclusive_in_the_users_zone() {
        let body = to_google_event(&event(true), chrono_tz::Europe::Berlin);
        assert_eq!(body.start.unwrap().date.as_deref(), Some("2025-03-10"));
        assert_eq!(body.end.unwrap().date.as_deref(), Some("2025-03-12"));
    }

    #[test]
    fn timed_events_are_sent_in_utc_without_an_id() {
        let body = to_google_event(&event(false), Tz::UTC);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["start"]["dateTime"], "2025-03-09T23:00:00+00:00");
        assert_eq!(json["start"]["timeZone"], "UTC");
        assert!(json.get("htmlLink").is_none());
    }
}
