//! Thin REST client for the Google Calendar API v3.

use eventhub_core::credentials::Credential;
use eventhub_core::date_range::SyncWindow;
use eventhub_core::{EventHubError, EventHubResult, Source};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::types::{CalendarListEntry, CalendarListPage, ErrorEnvelope, EventsPage, GoogleEvent};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Upper bound Google accepts for `maxResults` on events.list
const PAGE_SIZE: &str = "2500";

#[derive(Debug, Clone)]
pub struct GoogleApi {
    http: reqwest::Client,
    base_url: Url,
}

impl GoogleApi {
    pub fn new(base_url: &str) -> EventHubResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EventHubError::Config(format!("Invalid Google API URL '{base_url}': {e}")))?;
        Ok(GoogleApi {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    /// Build an endpoint URL, percent-encoding every segment. Calendar ids
    /// contain `@` and `#`.
    fn endpoint(&self, segments: &[&str]) -> EventHubResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EventHubError::Config(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, credential: &Credential) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&credential.access_token)
    }

    /// GET /users/me/calendarList, all pages
    pub async fn list_calendars(&self, credential: &Credential) -> EventHubResult<Vec<CalendarListEntry>> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.request(Method::GET, url.clone(), credential);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: CalendarListPage = decode(send(req, "list calendars").await?).await?;
            calendars.extend(page.items.into_iter().filter(|c| !c.id.is_empty()));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    /// GET /calendars/{id}/events within `window`, recurring events expanded into instances
    pub async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> EventHubResult<Vec<GoogleEvent>> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let time_min = window.from_rfc3339();
        let time_max = window.to_rfc3339();
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.request(Method::GET, url.clone(), credential).query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("maxResults", PAGE_SIZE),
                ("orderBy", "startTime"),
            ]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: EventsPage = decode(send(req, "list events").await?).await?;
            debug!(calendar = calendar_id, events = page.items.len(), "Fetched events page");
            events.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }

    /// POST /calendars/{id}/events
    pub async fn insert_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        body: &GoogleEvent,
    ) -> EventHubResult<GoogleEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let req = self.request(Method::POST, url, credential).json(body);
        decode(send(req, "create event").await?).await
    }

    /// PUT /calendars/{id}/events/{eventId}
    pub async fn update_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
        body: &GoogleEvent,
    ) -> EventHubResult<GoogleEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let req = self.request(Method::PUT, url, credential).json(body);
        decode(send(req, "update event").await?).await
    }

    /// DELETE /calendars/{id}/events/{eventId}. An event that is already gone counts as deleted.
    pub async fn delete_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
    ) -> EventHubResult<()> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let req = self.request(Method::DELETE, url, credential);
        match send(req, "delete event").await {
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
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    debug!(status = status.as_u16(), context, message = %message, "Google API error");

    let context = if message.is_empty() || status == StatusCode::NOT_FOUND {
        context.to_string()
    } else {
        format!("{context}: {message}")
    };
    Err(EventHubError::from_status(Source::Google, status.as_u16(), &context))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> EventHubResult<T> {
    resp.json()
        .await
        .map_err(|e| EventHubError::Serialization(format!("Unexpected Google response: {e}")))
}

fn transport_error(e: reqwest::Error) -> EventHubError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        EventHubError::NetworkUnavailable(e.to_string())
    } else {
        EventHubError::Provider(format!("google: {e}"))
    }
}
