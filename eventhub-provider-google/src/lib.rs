//! Google Calendar adapter.
//!
//! Speaks the Calendar API v3 with a bearer token supplied by the engine's
//! credential provider. Token acquisition and refresh are the host's job.

mod api;
mod from_google;
mod to_google;
pub mod types;

use async_trait::async_trait;
use chrono_tz::Tz;
use eventhub_core::credentials::Credential;
use eventhub_core::date_range::SyncWindow;
use eventhub_core::normalize::{RawCalendar, RawEvent};
use eventhub_core::provider::CalendarProvider;
use eventhub_core::{EventHubResult, Source, UnifiedEvent};

pub use api::{DEFAULT_BASE_URL, GoogleApi};
use from_google::{from_google_calendar, from_google_event, is_cancelled};
use to_google::to_google_event;

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    api: GoogleApi,
    /// Zone all-day events are written in
    timezone: Tz,
}

impl GoogleProvider {
    pub fn new() -> EventHubResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> EventHubResult<Self> {
        Ok(GoogleProvider {
            api: GoogleApi::new(base_url)?,
            timezone: Tz::UTC,
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}

#[async_trait]
impl CalendarProvider for GoogleProvider {
    fn source(&self) -> Source {
        Source::Google
    }

    async fn fetch_calendars(&self, credential: &Credential) -> EventHubResult<Vec<RawCalendar>> {
        let entries = self.api.list_calendars(credential).await?;
        Ok(entries.into_iter().map(from_google_calendar).collect())
    }

    async fn fetch_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> EventHubResult<Vec<RawEvent>> {
        let events = self.api.list_events(credential, calendar_id, window).await?;
        Ok(events
            .into_iter()
            .filter(|e| !is_cancelled(e) && !e.id.is_empty())
            .map(from_google_event)
            .collect())
    }

    async fn create_event(&self, credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        let body = to_google_event(event, self.timezone);
        let created = self
            .api
            .insert_event(credential, &event.calendar_id, &body)
            .await?;
        Ok(from_google_event(created))
    }

    async fn update_event(&self, credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        let body = to_google_event(event, self.timezone);
        let updated = self
            .api
            .update_event(credential, &event.calendar_id, &event.id, &body)
            .await?;
        Ok(from_google_event(updated))
    }

    async fn delete_event(&self, credential: &Credential, calendar_id: &str, event_id: &str) -> EventHubResult<()> {
        self.api.delete_event(credential, calendar_id, event_id).await
    }
}
