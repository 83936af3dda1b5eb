//! Microsoft Outlook adapter over the Graph API.
//!
//! Token acquisition is the host's job; every call carries the bearer token
//! handed in by the engine.

mod api;
mod from_graph;
mod to_graph;
pub mod types;

use async_trait::async_trait;
use chrono_tz::Tz;
use eventhub_core::credentials::Credential;
use eventhub_core::date_range::SyncWindow;
use eventhub_core::normalize::{RawCalendar, RawEvent};
use eventhub_core::provider::CalendarProvider;
use eventhub_core::{EventHubResult, Source, UnifiedEvent};

pub use api::{DEFAULT_BASE_URL, GraphApi, PRIMARY_CALENDAR};
use from_graph::{from_graph_calendar, from_graph_event};
use to_graph::to_graph_event;

#[derive(Debug, Clone)]
pub struct OutlookProvider {
    api: GraphApi,
    /// Zone all-day events are written in
    timezone: Tz,
}

impl OutlookProvider {
    pub fn new() -> EventHubResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> EventHubResult<Self> {
        Ok(OutlookProvider {
            api: GraphApi::new(base_url)?,
            timezone: Tz::UTC,
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}

#[async_trait]
impl CalendarProvider for OutlookProvider {
    fn source(&self) -> Source {
        Source::Microsoft
    }

    async fn fetch_calendars(&self, credential: &Credential) -> EventHubResult<Vec<RawCalendar>> {
        let calendars = self.api.list_calendars(credential).await?;
        Ok(calendars.into_iter().map(from_graph_calendar).collect())
    }

    async fn fetch_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> EventHubResult<Vec<RawEvent>> {
        let events = self.api.calendar_view(credential, calendar_id, window).await?;
        Ok(events
            .into_iter()
            .filter(|e| !e.is_cancelled && !e.id.is_empty())
            .map(from_graph_event)
            .collect())
    }

    async fn create_event(&self, credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        let body = to_graph_event(event, self.timezone);
        let created = self.api.create_event(credential, &event.calendar_id, &body).await?;
        Ok(from_graph_event(created))
    }

    async fn update_event(&self, credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        let body = to_graph_event(event, self.timezone);
        let updated = self.api.update_event(credential, &event.id, &body).await?;
        Ok(from_graph_event(updated))
    }

    async fn delete_event(&self, credential: &Credential, _calendar_id: &str, event_id: &str) -> EventHubResult<()> {
        self.api.delete_event(credential, event_id).await
    }
}
