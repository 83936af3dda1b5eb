#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eventhub_core::config::EngineConfig;
use eventhub_core::credentials::{Credential, StaticCredentials};
use eventhub_core::date_range::SyncWindow;
use eventhub_core::normalize::{RawCalendar, RawEvent, RawTime};
use eventhub_core::provider::CalendarProvider;
use eventhub_core::store::{
    Collection, Document, DocumentStore, MemoryStore, Query, Subscription, WriteOp,
};
use eventhub_core::{EventHubError, EventHubResult, Source, UnifiedEvent, UserId};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// Provider backed by in-memory calendars. Writes are applied to its own
/// event lists, so the next fetch sees them like a real API would.
pub struct FakeProvider {
    source: Source,
    calendars: Mutex<Vec<RawCalendar>>,
    events: Mutex<HashMap<String, Vec<RawEvent>>>,
    fetch_error: Mutex<Option<EventHubError>>,
    write_error: Mutex<Option<EventHubError>>,
    fetch_delay: Mutex<Duration>,
    next_id: AtomicUsize,
    pub fetches: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeProvider {
    pub fn new(source: Source) -> Self {
        FakeProvider {
            source,
            calendars: Mutex::new(Vec::new()),
            events: Mutex::new(HashMap::new()),
            fetch_error: Mutex::new(None),
            write_error: Mutex::new(None),
            fetch_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicUsize::new(1),
            fetches: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn with_calendar(self, id: &str, name: &str, events: Vec<RawEvent>) -> Self {
        self.calendars.lock().unwrap().push(RawCalendar {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
            is_primary: id == "primary",
        });
        self.events.lock().unwrap().insert(id.to_string(), events);
        self
    }

    pub fn set_events(&self, calendar_id: &str, events: Vec<RawEvent>) {
        self.events
            .lock()
            .unwrap()
            .insert(calendar_id.to_string(), events);
    }

    pub fn events_of(&self, calendar_id: &str) -> Vec<RawEvent> {
        self.events
            .lock()
            .unwrap()
            .get(calendar_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_fetches(&self, error: Option<EventHubError>) {
        *self.fetch_error.lock().unwrap() = error;
    }

    pub fn fail_writes(&self, error: Option<EventHubError>) {
        *self.write_error.lock().unwrap() = error;
    }

    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    fn check_write(&self) -> EventHubResult<()> {
        match self.write_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn to_raw(event: &UnifiedEvent, id: String) -> RawEvent {
        RawEvent {
            id,
            title: Some(event.title.clone()),
            start: RawTime::DateTime {
                value: event.start.to_rfc3339(),
                time_zone: None,
            },
            end: RawTime::DateTime {
                value: event.end.to_rfc3339(),
                time_zone: None,
            },
            all_day: Some(false),
            location: event.location.clone(),
            description: event.description.clone(),
            attendees: event.attendees.clone(),
            organizer: event.organizer.clone(),
            external_link: None,
            updated: Some(chrono::Utc::now()),
        }
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_calendars(&self, _credential: &Credential) -> EventHubResult<Vec<RawCalendar>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.fetch_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn fetch_events(
        &self,
        _credential: &Credential,
        calendar_id: &str,
        _window: &SyncWindow,
    ) -> EventHubResult<Vec<RawEvent>> {
        self.events
            .lock()
            .unwrap()
            .get(calendar_id)
            .cloned()
            .ok_or_else(|| EventHubError::NotFound(format!("calendar {calendar_id}")))
    }

    async fn create_event(&self, _credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        self.check_write()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let raw = Self::to_raw(event, id);
        self.events
            .lock()
            .unwrap()
            .entry(event.calendar_id.clone())
            .or_default()
            .push(raw.clone());
        Ok(raw)
    }

    async fn update_event(&self, _credential: &Credential, event: &UnifiedEvent) -> EventHubResult<RawEvent> {
        self.check_write()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let raw = Self::to_raw(event, event.id.clone());
        let mut events = self.events.lock().unwrap();
        let list = events.entry(event.calendar_id.clone()).or_default();
        list.retain(|e| e.id != event.id);
        list.push(raw.clone());
        Ok(raw)
    }

    async fn delete_event(&self, _credential: &Credential, calendar_id: &str, event_id: &str) -> EventHubResult<()> {
        self.check_write()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(list) = self.events.lock().unwrap().get_mut(calendar_id) {
            list.retain(|e| e.id != event_id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store wrapper counting event batches
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryStore`, counting commits that touch the events collection.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub event_commits: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        CountingStore {
            inner: MemoryStore::new(),
            event_commits: AtomicUsize::new(0),
        }
    }

    pub fn event_commits(&self) -> usize {
        self.event_commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn get_all(&self, user: &UserId, collection: Collection) -> EventHubResult<Vec<Document>> {
        self.inner.get_all(user, collection).await
    }

    async fn get(&self, user: &UserId, collection: Collection, id: &str) -> EventHubResult<Option<Document>> {
        self.inner.get(user, collection, id).await
    }

    async fn batch_write(&self, user: &UserId, ops: Vec<WriteOp>) -> EventHubResult<()> {
        let touches_events = ops.iter().any(|op| op.collection() == Collection::Events);
        self.inner.batch_write(user, ops).await?;
        if touches_events {
            self.event_commits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn subscribe(&self, user: &UserId, query: Query) -> EventHubResult<Subscription> {
        self.inner.subscribe(user, query).await
    }
}

// ---------------------------------------------------------------------------
// Store wrapper holding one events read open
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryStore`. Once armed, the next full read of the events
/// collection takes its snapshot, signals `reached` and waits for `release`
/// before returning it, so a test can commit changes the reader has not seen.
pub struct PausingStore {
    pub inner: MemoryStore,
    armed: AtomicBool,
    pub reached: Notify,
    pub release: Notify,
}

impl PausingStore {
    pub fn new() -> Self {
        PausingStore {
            inner: MemoryStore::new(),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn pause_next_events_read(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for PausingStore {
    async fn get_all(&self, user: &UserId, collection: Collection) -> EventHubResult<Vec<Document>> {
        let docs = self.inner.get_all(user, collection).await?;
        if collection == Collection::Events && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(docs)
    }

    async fn get(&self, user: &UserId, collection: Collection, id: &str) -> EventHubResult<Option<Document>> {
        self.inner.get(user, collection, id).await
    }

    async fn batch_write(&self, user: &UserId, ops: Vec<WriteOp>) -> EventHubResult<()> {
        self.inner.batch_write(user, ops).await
    }

    async fn subscribe(&self, user: &UserId, query: Query) -> EventHubResult<Subscription> {
        self.inner.subscribe(user, query).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn user() -> UserId {
    UserId::new("user-1")
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::new()
            .with(Source::Google, Credential::bearer("google-token"))
            .with(Source::Microsoft, Credential::bearer("graph-token")),
    )
}

/// Engine config with immediate retries, so replay tests need no clock control.
pub fn config() -> EngineConfig {
    EngineConfig {
        retry_base_delay: Duration::ZERO,
        retry_max_delay: Duration::ZERO,
        max_retries: 3,
        ..EngineConfig::default()
    }
}

pub fn timed(id: &str, title: &str, start: &str, end: &str) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        title: Some(title.to_string()),
        start: RawTime::DateTime {
            value: start.to_string(),
            time_zone: None,
        },
        end: RawTime::DateTime {
            value: end.to_string(),
            time_zone: None,
        },
        all_day: None,
        location: None,
        description: None,
        attendees: vec![],
        organizer: None,
        external_link: None,
        updated: Some("2025-01-01T00:00:00Z".parse().unwrap()),
    }
}

pub fn all_day(id: &str, title: &str, date: &str, end_date: &str) -> RawEvent {
    RawEvent {
        start: RawTime::Date(date.to_string()),
        end: RawTime::Date(end_date.to_string()),
        ..timed(id, title, "", "")
    }
}
