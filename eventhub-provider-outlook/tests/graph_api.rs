use chrono::{NaiveDate, TimeZone, Utc};
use eventhub_core::credentials::Credential;
use eventhub_core::date_range::SyncWindow;
use eventhub_core::normalize::Normalizer;
use eventhub_core::provider::CalendarProvider;
use eventhub_core::{EventHubError, Source, UnifiedEvent};
use eventhub_provider_outlook::OutlookProvider;
use mockito::{Matcher, Server};

fn credential() -> Credential {
    Credential::bearer("eyJ0eXAi.graph")
}

fn window() -> SyncWindow {
    SyncWindow::around(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(), 30, 90)
}

fn event(calendar_id: &str, id: &str) -> UnifiedEvent {
    UnifiedEvent {
        id: id.into(),
        title: "Review".into(),
        start: Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2025, 3, 12, 11, 0, 0).unwrap(),
        is_all_day: false,
        location: None,
        description: None,
        attendees: vec![],
        organizer: None,
        calendar_id: calendar_id.into(),
        calendar_name: "Calendar".into(),
        calendar_color: "#0078d4".into(),
        source: Source::Microsoft,
        external_link: None,
        source_updated_at: None,
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follows_next_links_when_listing_calendars() {
    let mut server = Server::new_async().await;
    let next = format!("{}/me/calendars?$skip=1", server.url());
    let first = server
        .mock("GET", "/me/calendars")
        .match_header("authorization", "Bearer eyJ0eXAi.graph")
        .match_query(Matcher::Regex("^$".into()))
        .with_header("content-type", "application/json")
        .with_body(format!(
            r##"{{"value":[{{"id":"AAMkDefault","name":"Calendar","hexColor":"","isDefaultCalendar":true}}],
                "@odata.nextLink":"{next}"}}"##
        ))
        .create_async()
        .await;
    let second = server
        .mock("GET", "/me/calendars")
        .match_query(Matcher::UrlEncoded("$skip".into(), "1".into()))
        .with_header("content-type", "application/json")
        .with_body(r##"{"value":[{"id":"AAMkTeam","name":"Team","hexColor":"#e81123"}]}"##)
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();
    let calendars = provider.fetch_calendars(&credential()).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(calendars.len(), 2);
    assert!(calendars[0].is_primary);
    assert_eq!(calendars[0].color, None);
    assert_eq!(calendars[1].color.as_deref(), Some("#e81123"));
}

#[tokio::test]
async fn calendar_view_requests_utc_and_flags_all_day_events() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/me/calendars/AAMkTeam/calendarView")
        .match_header("prefer", "outlook.timezone=\"UTC\"")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("startDateTime".into(), "2025-01-30T00:00:00+00:00".into()),
            Matcher::UrlEncoded("endDateTime".into(), "2025-05-30T00:00:00+00:00".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"value":[
                {"id":"AAMk1","subject":"Offsite","isAllDay":true,
                 "start":{"dateTime":"2025-03-10T00:00:00.0000000","timeZone":"UTC"},
                 "end":{"dateTime":"2025-03-11T00:00:00.0000000","timeZone":"UTC"},
                 "organizer":{"emailAddress":{"name":"Lee","address":"lee@example.com"}},
                 "lastModifiedDateTime":"2025-02-20T08:00:00Z"},
                {"id":"AAMk2","subject":"Dropped","isCancelled":true,
                 "start":{"dateTime":"2025-03-11T09:00:00.0000000","timeZone":"UTC"},
                 "end":{"dateTime":"2025-03-11T10:00:00.0000000","timeZone":"UTC"}}
            ]}"#,
        )
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();
    let raw = provider
        .fetch_events(&credential(), "AAMkTeam", &window())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].all_day, Some(true));
    assert_eq!(raw[0].organizer.as_ref().unwrap().email, "lee@example.com");

    let calendar = Normalizer::default().calendar(
        &eventhub_core::normalize::RawCalendar {
            id: "AAMkTeam".into(),
            name: "Team".into(),
            color: None,
            is_primary: false,
        },
        Source::Microsoft,
    );
    let unified = Normalizer::default().normalize(&raw[0], &calendar).unwrap();
    let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    assert_eq!(unified.start.date_naive(), day);
    assert_eq!(unified.end.date_naive(), day);
    assert_eq!(unified.calendar_color, "#0078d4");
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn default_calendar_writes_go_to_me_events() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/me/events")
        .match_body(Matcher::PartialJsonString(
            r#"{"subject":"Review","start":{"dateTime":"2025-03-12T10:00:00","timeZone":"UTC"}}"#.into(),
        ))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"AAMkNew","subject":"Review",
                "start":{"dateTime":"2025-03-12T10:00:00.0000000","timeZone":"UTC"},
                "end":{"dateTime":"2025-03-12T11:00:00.0000000","timeZone":"UTC"}}"#,
        )
        .create_async()
        .await;
    let update = server
        .mock("PATCH", "/me/events/AAMkNew")
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"AAMkNew","subject":"Review"}"#)
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();
    let created = provider
        .create_event(&credential(), &event("primary", "local_1"))
        .await
        .unwrap();
    assert_eq!(created.id, "AAMkNew");

    provider
        .update_event(&credential(), &event("primary", "AAMkNew"))
        .await
        .unwrap();

    create.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn other_calendars_create_under_their_own_collection() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/me/calendars/AAMkTeam/events")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"AAMkTeamNew"}"#)
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();
    let created = provider
        .create_event(&credential(), &event("AAMkTeam", "local_2"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(created.id, "AAMkTeamNew");
}

#[tokio::test]
async fn deleting_a_missing_event_succeeds() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/me/events/AAMkGone")
        .with_status(404)
        .with_body(r#"{"error":{"code":"ErrorItemNotFound","message":"The specified object was not found in the store."}}"#)
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();
    provider
        .delete_event(&credential(), "AAMkTeam", "AAMkGone")
        .await
        .unwrap();
    mock.assert_async().await;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn throttling_and_permission_errors_are_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/me/calendars")
        .with_status(429)
        .create_async()
        .await;
    server
        .mock("GET", "/me/calendars/AAMkTeam/calendarView")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body(r#"{"error":{"code":"ErrorAccessDenied","message":"Access is denied."}}"#)
        .create_async()
        .await;

    let provider = OutlookProvider::with_base_url(&server.url()).unwrap();

    let err = provider.fetch_calendars(&credential()).await.unwrap_err();
    assert_eq!(err, EventHubError::RateLimited(Source::Microsoft));
    assert!(err.is_transient());

    let err = provider
        .fetch_events(&credential(), "AAMkTeam", &window())
        .await
        .unwrap_err();
    match err {
        EventHubError::PermissionDenied(Source::Microsoft, detail) => {
            assert!(detail.contains("ErrorAccessDenied"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
