//! Provider adapter contract.
//!
//! An adapter speaks one external calendar API and returns its data as
//! `RawCalendar`/`RawEvent`; everything provider-independent happens in
//! `normalize`. Adapters hold no credentials of their own: every call
//! receives one from the session's `CredentialProvider`.

use async_trait::async_trait;

use crate::credentials::Credential;
use crate::date_range::SyncWindow;
use crate::error::EventHubResult;
use crate::event::{Source, UnifiedEvent};
use crate::normalize::{RawCalendar, RawEvent};

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn source(&self) -> Source;

    /// Calendars visible to the credential's owner.
    async fn fetch_calendars(&self, credential: &Credential) -> EventHubResult<Vec<RawCalendar>>;

    /// Every event of `calendar_id` overlapping `window`, recurring series expanded.
    async fn fetch_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> EventHubResult<Vec<RawEvent>>;

    /// Create `event` on its calendar and return the provider's copy, carrying the assigned id.
    async fn create_event(
        &self,
        credential: &Credential,
        event: &UnifiedEvent,
    ) -> EventHubResult<RawEvent>;

    async fn update_event(
        &self,
        credential: &Credential,
        event: &UnifiedEvent,
    ) -> EventHubResult<RawEvent>;

    /// Delete an event. Succeeds when the event is already gone.
    async fn delete_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event_id: &str,
    ) -> EventHubResult<()>;
}
