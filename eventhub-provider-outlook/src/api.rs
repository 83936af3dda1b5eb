//! Thin REST client for the Microsoft Graph calendar endpoints.

use eventhub_core::credentials::Credential;
use eventhub_core::date_range::SyncWindow;
use eventhub_core::{EventHubError, EventHubResult, Source};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::types::{ErrorEnvelope, GraphCalendar, GraphEvent, Page};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Calendar id the engine uses for "the user's default calendar"
pub const PRIMARY_CALENDAR: &str = "primary";

const PAGE_SIZE: &str = "500";

/// Ask Graph to express all date-times in UTC
const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

#[derive(Debug, Clone)]
pub struct GraphApi {
    http: reqwest::Client,
    base_url: Url,
}

impl GraphApi {
    pub fn new(base_url: &str) -> EventHubResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EventHubError::Config(format!("Invalid Graph API URL '{base_url}': {e}")))?;
        Ok(GraphApi {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> EventHubResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EventHubError::Config(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Events of the default calendar live under `/me`, others under their calendar.
    fn events_collection(&self, calendar_id: &str) -> EventHubResult<Url> {
        if calendar_id == PRIMARY_CALENDAR {
            self.endpoint(&["me", "events"])
        } else {
            self.endpoint(&["me", "calendars", calendar_id, "events"])
        }
    }

    fn request(&self, method: Method, url: Url, credential: &Credential) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&credential.access_token)
            .header("Prefer", PREFER_UTC)
    }

    /// Follow `@odata.nextLink` until the collection is exhausted.
    async fn collect<T: DeserializeOwned>(
        &self,
        first: RequestBuilder,
        credential: &Credential,
        context: &str,
    ) -> EventHubResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page: Page<T> = decode(send(first, context).await?).await?;

        loop {
            items.append(&mut page.value);
            let Some(next) = page.next_link.take() else {
                break;
            };
            let url = Url::parse(&next)
                .map_err(|e| EventHubError::Provider(format!("microsoft: bad next link: {e}")))?;
            page = decode(send(self.request(Method::GET, url, credential), context).await?).await?;
        }

        Ok(items)
    }

    /// GET /me/calendars
    pub async fn list_calendars(&self, credential: &Credential) -> EventHubResult<Vec<GraphCalendar>> {
        let url = self.endpoint(&["me", "calendars"])?;
        let req = self.request(Method::GET, url, credential);
        self.collect(req, credential, "list calendars").await
    }

    /// GET /me/calendars/{id}/calendarView, which expands recurring series
    pub async fn calendar_view(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> EventHubResult<Vec<GraphEvent>> {
        let url = if calendar_id == PRIMARY_CALENDAR {
            self.endpoint(&["me", "calendarView"])?
        } else {
            self.endpoint(&["me", "calendars", calendar_id, "calendarView"])?
        };
        let req = self.request(Method::GET, url, credential).query(&[
            ("startDateTime", window.from_rfc3339().as_str()),
            ("endDateTime", window.to_rfc3339().as_str()),
            ("$top", PAGE_SIZE),
        ]);
        let events: Vec<GraphEvent> = self.collect(req, credential, "list events").await?;
        debug!(calendar = calendar_id, events = events.len(), "Fetched calendar view");
        Ok(events)
    }

    /// POST /me/calendars/{id}/events, or /me/events for the default calendar
    pub async fn create_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        body: &GraphEvent,
    ) -> EventHubResult<GraphEvent> {
        let url = self.events_collection(calendar_id)?;
        let req = self.request(Method::POST, url, credential).json(body);
        decode(send(req, "create event").await?).await
    }

    /// PATCH /me/events/{id}
    pub async fn update_event(
        &self,
        credential: &Credential,
        event_id: &str,
        body: &GraphEvent,
    ) -> EventHubResult<GraphEvent> {
        let url = self.endpoint(&["me", "events", event_id])?;
        let req = self.request(Method::PATCH, url, credential).json(body);
        decode(send(req, "update event").await?).await
    }

    /// DELETE /me/events/{id}. An event that is already gone counts as deleted.
    pub async fn delete_event(&self, credential: &Credential, event_id: &str) -> EventHubResult<()> {
        let url = self.endpoint(&["me", "events", event_id])?;
        match send(self.request(Method::DELETE, url, credential), "delete event").await {
            Ok(_) => Ok(()),
            Err(EventHubError::NotFound(_)) => {
                debug!(event = event_id, "Event already deleted upstream");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn send(req: RequestBuilder, context: &str) -> EventHubResult<Response> {
    let resp = req.send().await.map_err(transport_error)?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| format!("{} {}", e.error.code, e.error.message).trim().to_string())
        .unwrap_or(body);
    debug!(status = status.as_u16(), context, detail = %detail, "Graph API error");

    let context = if detail.is_empty() {
        context.to_string()
    } else {
        format!("{context}: {detail}")
    };
    Err(EventHubError::from_status(Source::Microsoft, status.as_u16(), &context))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> EventHubResult<T> {
    resp.json()
        .await
        .map_err(|e| EventHubError::Serialization(format!("Unexpected Graph response: {e}")))
}

fn transport_error(e: reqwest::Error) -> EventHubError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        EventHubError::NetworkUnavailable(e.to_string())
    } else {
        EventHubError::Provider(format!("microsoft: {e}"))
    }
}
