//! Offline mutation queue.
//!
//! Local create/update/delete is written to the store first, tagged `pending`,
//! so views reflect it at once. The change is then pushed to the provider
//! directly when online. Only a push that could not happen or failed leaves a
//! `SyncQueueItem` behind, which `sync_offline_events` replays later with
//! exponential backoff until it succeeds or runs out of attempts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constants::{LOCAL_ID_PREFIX, UNTITLED_EVENT};
use crate::credentials::CredentialProvider;
use crate::error::{EventHubError, EventHubResult};
use crate::event::{
    EventDraft, EventKey, EventPatch, Source, StoredEvent, SyncStatus, UnifiedCalendar,
    UnifiedEvent, UserId,
};
use crate::normalize::{Normalizer, RawEvent, validate_instant};
use crate::notifier::{NotificationKind, Notifier};
use crate::provider::CalendarProvider;
use crate::store::{
    Collection, DocumentStore, WriteOp, decode_all, load_event, load_events, to_fields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationKind::Add => "add",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A local mutation not yet confirmed by its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    /// Store key of the affected event
    pub event_key: String,
    /// The event for add/delete, the patch for update
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    /// Version of the event document this mutation produced
    pub base_version: u64,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Out of automatic attempts; waits for `retry_failed_mutations`
    #[serde(default)]
    pub terminal: bool,
}

impl SyncQueueItem {
    fn new(
        kind: MutationKind,
        key: &EventKey,
        payload: serde_json::Value,
        base_version: u64,
        now: DateTime<Utc>,
    ) -> Self {
        SyncQueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            event_key: key.to_string(),
            payload,
            timestamp: now,
            retry_count: 0,
            base_version,
            next_attempt_at: now,
            last_error: None,
            terminal: false,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.terminal && self.next_attempt_at <= now
    }

    /// True when the stored copy outranks the version this mutation wrote,
    /// which means a newer upstream copy replaced the local edit.
    fn is_superseded_by(&self, stored: &StoredEvent) -> bool {
        stored.precedence() > (self.base_version, SyncStatus::Pending.rank())
    }
}

/// Result of one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Updates dropped because upstream changed the event afterwards
    pub superseded: usize,
    /// Items whose event no longer exists locally
    pub dropped: usize,
    /// Items that exhausted their attempts during this run
    pub terminal: usize,
    /// Items still waiting out their backoff
    pub deferred: usize,
}

pub struct OfflineQueue {
    user: UserId,
    store: Arc<dyn DocumentStore>,
    providers: HashMap<Source, Arc<dyn CalendarProvider>>,
    credentials: Arc<dyn CredentialProvider>,
    notifier: Notifier,
    normalizer: Normalizer,
    config: EngineConfig,
    online: watch::Receiver<bool>,
    replaying: AtomicBool,
}

struct Replaying<'a>(&'a AtomicBool);

impl Drop for Replaying<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Attempt {
    Done,
    Superseded,
    Dropped,
    Failed(EventHubError),
}

impl OfflineQueue {
    pub fn new(
        user: UserId,
        store: Arc<dyn DocumentStore>,
        providers: Vec<Arc<dyn CalendarProvider>>,
        credentials: Arc<dyn CredentialProvider>,
        notifier: Notifier,
        config: EngineConfig,
        online: watch::Receiver<bool>,
    ) -> EventHubResult<Self> {
        Ok(OfflineQueue {
            user,
            store,
            providers: providers.into_iter().map(|p| (p.source(), p)).collect(),
            credentials,
            notifier,
            normalizer: Normalizer::new(config.tz()?),
            config,
            online,
            replaying: AtomicBool::new(false),
        })
    }

    fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub async fn pending_items(&self) -> EventHubResult<Vec<SyncQueueItem>> {
        let docs = self.store.get_all(&self.user, Collection::SyncQueue).await?;
        let mut items: Vec<SyncQueueItem> = decode_all(&docs)?;
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(items)
    }

    async fn items_for(&self, key: &str) -> EventHubResult<Vec<SyncQueueItem>> {
        Ok(self
            .pending_items()
            .await?
            .into_iter()
            .filter(|i| i.event_key == key)
            .collect())
    }

    /// Create an event locally and push it to its provider.
    pub async fn add_event(&self, draft: EventDraft) -> EventHubResult<StoredEvent> {
        let now = Utc::now();
        let event = self.event_from_draft(draft).await?;
        let key = event.key();

        let mut stored = StoredEvent {
            event,
            user_id: self.user.to_string(),
            sync_status: SyncStatus::Pending,
            version: 1,
            last_sync_at: now,
            created_at: now,
            updated_at: now,
            local_edit_at: Some(now),
            deleted_locally: false,
            pending_cycles: 0,
        };
        self.write(vec![WriteOp::set(Collection::Events, key.to_string(), &stored)?])
            .await?;

        let title = stored.event.title.clone();
        let pushed = if self.is_online() {
            self.push_create(&stored).await
        } else {
            Err(EventHubError::NetworkUnavailable("offline".into()))
        };

        match pushed {
            Ok(confirmed) => {
                let confirmed_key = confirmed.key();
                self.notifier
                    .emit(
                        NotificationKind::EventAdded,
                        "Event Added",
                        format!("{title} has been added"),
                        Some(confirmed_key.to_string()),
                    )
                    .await;
                Ok(confirmed)
            }
            Err(e) => {
                let item = SyncQueueItem::new(
                    MutationKind::Add,
                    &key,
                    serde_json::to_value(&stored.event)?,
                    stored.version,
                    now,
                );
                self.enqueue(&mut stored, item, &e).await?;
                self.notify_unconfirmed(MutationKind::Add, &key, &e).await;
                Ok(stored)
            }
        }
    }

    /// Apply `patch` locally and push the result to the provider.
    pub async fn update_event(&self, key: &EventKey, patch: EventPatch) -> EventHubResult<StoredEvent> {
        let mut stored = self.require(key).await?;
        if patch.is_empty() {
            return Ok(stored);
        }

        let now = Utc::now();
        patch.apply(&mut stored.event);
        validate_times(&stored.event)?;
        stored.version += 1;
        stored.sync_status = SyncStatus::Pending;
        stored.local_edit_at = Some(now);
        stored.updated_at = now;
        self.write(vec![WriteOp::set(Collection::Events, key.to_string(), &stored)?])
            .await?;

        let title = stored.event.title.clone();

        // Unconfirmed adds carry their latest content when replayed
        if key.is_local_only() {
            return Ok(stored);
        }

        let pushed = if self.is_online() {
            self.push_update(&stored).await
        } else {
            Err(EventHubError::NetworkUnavailable("offline".into()))
        };

        match pushed {
            Ok(confirmed) => {
                // The direct push carried the full content, earlier queued updates are moot
                let stale: Vec<WriteOp> = self
                    .items_for(&key.to_string())
                    .await?
                    .into_iter()
                    .filter(|i| i.kind == MutationKind::Update)
                    .map(|i| WriteOp::delete(Collection::SyncQueue, i.id))
                    .collect();
                if !stale.is_empty() {
                    self.write(stale).await?;
                }
                self.notifier
                    .emit(
                        NotificationKind::EventUpdated,
                        "Event Updated",
                        format!("{title} has been updated"),
                        Some(key.to_string()),
                    )
                    .await;
                Ok(confirmed)
            }
            Err(e) => {
                let existing = self
                    .items_for(&key.to_string())
                    .await?
                    .into_iter()
                    .find(|i| i.kind == MutationKind::Update && !i.terminal);

                let item = match existing {
                    // Fold into the queued update so replay sends one request
                    Some(mut item) => {
                        let mut merged: EventPatch = serde_json::from_value(item.payload.clone())
                            .map_err(|e| {
                                EventHubError::Serialization(format!(
                                    "queued update {} for {key}: {e}",
                                    item.id
                                ))
                            })?;
                        merge_patch(&mut merged, &patch);
                        item.payload = serde_json::to_value(&merged)?;
                        item.base_version = stored.version;
                        item
                    }
                    None => SyncQueueItem::new(
                        MutationKind::Update,
                        key,
                        serde_json::to_value(&patch)?,
                        stored.version,
                        now,
                    ),
                };
                self.enqueue(&mut stored, item, &e).await?;
                self.notify_unconfirmed(MutationKind::Update, key, &e).await;
                Ok(stored)
            }
        }
    }

    /// Delete an event locally and at its provider. Returns true when the
    /// provider confirmed the delete.
    pub async fn delete_event(&self, key: &EventKey) -> EventHubResult<bool> {
        let mut stored = self.require(key).await?;
        let now = Utc::now();
        let queued = self.items_for(&key.to_string()).await?;

        if key.is_local_only() {
            // Never reached the provider: forget it along with its queued add
            let mut ops = vec![WriteOp::delete(Collection::Events, key.to_string())];
            ops.extend(queued.into_iter().map(|i| WriteOp::delete(Collection::SyncQueue, i.id)));
            self.write(ops).await?;
            self.notify_deleted(key).await;
            return Ok(true);
        }

        stored.deleted_locally = true;
        stored.sync_status = SyncStatus::Pending;
        stored.version += 1;
        stored.local_edit_at = Some(now);
        stored.updated_at = now;
        self.write(vec![WriteOp::set(Collection::Events, key.to_string(), &stored)?])
            .await?;

        let pushed = if self.is_online() {
            self.push_delete(&stored.event).await
        } else {
            Err(EventHubError::NetworkUnavailable("offline".into()))
        };

        // A delete makes every queued change to the event irrelevant
        let mut ops: Vec<WriteOp> = queued
            .into_iter()
            .map(|i| WriteOp::delete(Collection::SyncQueue, i.id))
            .collect();

        match pushed {
            Ok(()) => {
                ops.push(WriteOp::delete(Collection::Events, key.to_string()));
                self.write(ops).await?;
                self.notify_deleted(key).await;
                Ok(true)
            }
            Err(e) => {
                if !ops.is_empty() {
                    self.write(ops).await?;
                }
                let item = SyncQueueItem::new(
                    MutationKind::Delete,
                    key,
                    serde_json::to_value(&stored.event)?,
                    stored.version,
                    now,
                );
                self.enqueue(&mut stored, item, &e).await?;
                self.notify_unconfirmed(MutationKind::Delete, key, &e).await;
                Ok(false)
            }
        }
    }

    /// Replay every due queued mutation. Fails with `NetworkUnavailable` while offline.
    pub async fn sync_offline_events(&self) -> EventHubResult<ReplayReport> {
        self.replay_due(Utc::now()).await
    }

    /// Replay the mutations due at `now`. Runs are never concurrent: a call
    /// made during a run returns an empty report.
    pub async fn replay_due(&self, now: DateTime<Utc>) -> EventHubResult<ReplayReport> {
        if !self.is_online() {
            return Err(EventHubError::NetworkUnavailable("offline".into()));
        }
        if self
            .replaying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(user = %self.user, "Replay already running");
            return Ok(ReplayReport::default());
        }
        let _replaying = Replaying(&self.replaying);

        let items = self.pending_items().await?;
        let mut report = ReplayReport::default();
        // Local ids confirmed during this run, so later items follow the new key
        let mut rekeyed: HashMap<String, String> = HashMap::new();

        for mut item in items {
            if item.terminal {
                continue;
            }
            if !item.is_due(now) {
                report.deferred += 1;
                continue;
            }
            if let Some(new_key) = rekeyed.get(&item.event_key) {
                item.event_key = new_key.clone();
            }

            report.attempted += 1;
            match self.replay_item(&item, &mut rekeyed).await {
                Ok(Attempt::Done) => report.succeeded += 1,
                Ok(Attempt::Superseded) => report.superseded += 1,
                Ok(Attempt::Dropped) => report.dropped += 1,
                Ok(Attempt::Failed(e)) | Err(e) => {
                    report.failed += 1;
                    if self.record_failure(item, &e, now).await? {
                        report.terminal += 1;
                    }
                }
            }
        }

        if report.attempted > 0 {
            info!(
                user = %self.user,
                succeeded = report.succeeded,
                failed = report.failed,
                superseded = report.superseded,
                "Replayed offline changes"
            );
        }
        Ok(report)
    }

    /// Give terminal items a fresh set of attempts. Returns how many were reset.
    pub async fn retry_failed_mutations(&self) -> EventHubResult<usize> {
        let now = Utc::now();
        let terminal: Vec<SyncQueueItem> = self
            .pending_items()
            .await?
            .into_iter()
            .filter(|i| i.terminal)
            .collect();

        let mut ops = Vec::new();
        for mut item in terminal.iter().cloned() {
            item.terminal = false;
            item.retry_count = 0;
            item.next_attempt_at = now;
            if let Some(stored) = load_event(self.store.as_ref(), &self.user, &item.event_key).await? {
                if stored.sync_status == SyncStatus::Error {
                    ops.push(status_update(&item.event_key, SyncStatus::Pending)?);
                }
            }
            ops.push(WriteOp::set(Collection::SyncQueue, item.id.clone(), &item)?);
        }

        if !ops.is_empty() {
            self.write(ops).await?;
        }
        Ok(terminal.len())
    }

    async fn replay_item(
        &self,
        item: &SyncQueueItem,
        rekeyed: &mut HashMap<String, String>,
    ) -> EventHubResult<Attempt> {
        let stored = load_event(self.store.as_ref(), &self.user, &item.event_key).await?;
        let forget = WriteOp::delete(Collection::SyncQueue, item.id.clone());

        let Some(stored) = stored else {
            debug!(key = %item.event_key, kind = %item.kind, "Event gone, dropping queued change");
            self.write(vec![forget]).await?;
            return Ok(Attempt::Dropped);
        };

        match item.kind {
            MutationKind::Add => match self.push_create(&stored).await {
                Ok(confirmed) => {
                    let new_key = confirmed.key().to_string();
                    // Later queued changes to the local id now target the provider id
                    let mut ops = vec![forget];
                    for other in self.items_for(&item.event_key).await? {
                        if other.id != item.id {
                            ops.push(WriteOp::update(
                                Collection::SyncQueue,
                                other.id,
                                to_fields(&json!({ "eventKey": new_key }))?,
                            ));
                        }
                    }
                    self.write(ops).await?;
                    rekeyed.insert(item.event_key.clone(), new_key.clone());
                    self.notifier
                        .emit(
                            NotificationKind::EventAdded,
                            "Event Added",
                            format!("{} has been added", confirmed.event.title),
                            Some(new_key),
                        )
                        .await;
                    Ok(Attempt::Done)
                }
                Err(e) => Ok(Attempt::Failed(e)),
            },
            MutationKind::Update => {
                if item.is_superseded_by(&stored) {
                    debug!(key = %item.event_key, "Queued update superseded upstream");
                    self.write(vec![forget]).await?;
                    return Ok(Attempt::Superseded);
                }
                match self.push_update(&stored).await {
                    Ok(confirmed) => {
                        self.write(vec![forget]).await?;
                        self.notifier
                            .emit(
                                NotificationKind::EventUpdated,
                                "Event Updated",
                                format!("{} has been updated", confirmed.event.title),
                                Some(item.event_key.clone()),
                            )
                            .await;
                        Ok(Attempt::Done)
                    }
                    Err(e) => Ok(Attempt::Failed(e)),
                }
            }
            MutationKind::Delete => match self.push_delete(&stored.event).await {
                Ok(()) => {
                    self.write(vec![
                        forget,
                        WriteOp::delete(Collection::Events, item.event_key.clone()),
                    ])
                    .await?;
                    if let Ok(key) = item.event_key.parse::<EventKey>() {
                        self.notify_deleted(&key).await;
                    }
                    Ok(Attempt::Done)
                }
                Err(e) => Ok(Attempt::Failed(e)),
            },
        }
    }

    /// Count a failed attempt. Returns true when the item became terminal.
    async fn record_failure(
        &self,
        mut item: SyncQueueItem,
        error: &EventHubError,
        now: DateTime<Utc>,
    ) -> EventHubResult<bool> {
        item.retry_count += 1;
        item.last_error = Some(error.to_string());
        let delay = Duration::from_std(self.config.retry_delay(item.retry_count))
            .unwrap_or(Duration::zero());
        item.next_attempt_at = now + delay;
        item.terminal = item.retry_count >= self.config.max_retries;

        let status = if item.terminal || !error.is_transient() {
            SyncStatus::Error
        } else {
            SyncStatus::Pending
        };

        warn!(
            key = %item.event_key,
            kind = %item.kind,
            attempt = item.retry_count,
            error = %error,
            "Replay failed"
        );

        let mut ops = vec![WriteOp::set(Collection::SyncQueue, item.id.clone(), &item)?];
        if load_event(self.store.as_ref(), &self.user, &item.event_key)
            .await?
            .is_some()
        {
            ops.push(status_update(&item.event_key, status)?);
        }
        self.write(ops).await?;

        if item.terminal {
            self.notifier
                .emit(
                    NotificationKind::SyncFailed,
                    "Sync Failed",
                    format!(
                        "Could not {} event after {} attempts: {error}",
                        item.kind, item.retry_count
                    ),
                    Some(item.event_key.clone()),
                )
                .await;
        }
        Ok(item.terminal)
    }

    /// Persist the queue item for an unconfirmed mutation and set the event's status.
    async fn enqueue(
        &self,
        stored: &mut StoredEvent,
        item: SyncQueueItem,
        error: &EventHubError,
    ) -> EventHubResult<()> {
        let offline = matches!(error, EventHubError::NetworkUnavailable(_));
        if !offline {
            warn!(key = %item.event_key, kind = %item.kind, error = %error, "Direct push failed, queueing");
        } else {
            debug!(key = %item.event_key, kind = %item.kind, "Offline, queueing");
        }

        let mut item = item;
        if !offline {
            item.retry_count = 1;
            item.last_error = Some(error.to_string());
            let delay = Duration::from_std(self.config.retry_delay(1)).unwrap_or(Duration::zero());
            item.next_attempt_at = item.timestamp + delay;
        }

        stored.sync_status = if error.is_transient() {
            SyncStatus::Pending
        } else {
            SyncStatus::Error
        };

        self.write(vec![
            WriteOp::set(Collection::SyncQueue, item.id.clone(), &item)?,
            WriteOp::set(Collection::Events, item.event_key.clone(), &*stored)?,
        ])
        .await
    }

    async fn push_create(&self, stored: &StoredEvent) -> EventHubResult<StoredEvent> {
        let provider = self.provider(stored.event.source)?;
        let credential = self.credentials.get_credential(stored.event.source)?;
        let raw = provider.create_event(&credential, &stored.event).await?;
        let now = Utc::now();

        let confirmed = StoredEvent {
            event: self.confirm(&stored.event, &raw),
            sync_status: SyncStatus::Synced,
            local_edit_at: None,
            last_sync_at: now,
            updated_at: now,
            ..stored.clone()
        };
        let new_key = confirmed.key();

        // Re-key: the local document is replaced by one under the provider's id
        let mut ops = Vec::new();
        if new_key != stored.key() {
            ops.push(WriteOp::delete(Collection::Events, stored.key().to_string()));
        }
        ops.push(WriteOp::set(Collection::Events, new_key.to_string(), &confirmed)?);
        self.write(ops).await?;

        debug!(local = %stored.key(), confirmed = %new_key, "Event created upstream");
        Ok(confirmed)
    }

    async fn push_update(&self, stored: &StoredEvent) -> EventHubResult<StoredEvent> {
        let provider = self.provider(stored.event.source)?;
        let credential = self.credentials.get_credential(stored.event.source)?;
        let raw = provider.update_event(&credential, &stored.event).await?;
        let now = Utc::now();

        let confirmed = StoredEvent {
            event: self.confirm(&stored.event, &raw),
            sync_status: SyncStatus::Synced,
            local_edit_at: None,
            last_sync_at: now,
            ..stored.clone()
        };
        self.write(vec![WriteOp::set(
            Collection::Events,
            confirmed.key().to_string(),
            &confirmed,
        )?])
        .await?;
        Ok(confirmed)
    }

    async fn push_delete(&self, event: &UnifiedEvent) -> EventHubResult<()> {
        let provider = self.provider(event.source)?;
        let credential = self.credentials.get_credential(event.source)?;
        provider
            .delete_event(&credential, &event.calendar_id, &event.id)
            .await
    }

    /// The provider's copy of a pushed event, falling back to the local content
    /// under the provider's id when the response does not normalize.
    fn confirm(&self, local: &UnifiedEvent, raw: &RawEvent) -> UnifiedEvent {
        let calendar = UnifiedCalendar {
            id: local.calendar_id.clone(),
            name: local.calendar_name.clone(),
            color: local.calendar_color.clone(),
            source: local.source,
            is_primary: false,
        };
        match self.normalizer.normalize(raw, &calendar) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %raw.id, error = %e, "Provider response did not normalize, keeping local copy");
                UnifiedEvent {
                    id: raw.id.clone(),
                    source_updated_at: raw.updated,
                    ..local.clone()
                }
            }
        }
    }

    fn provider(&self, source: Source) -> EventHubResult<&Arc<dyn CalendarProvider>> {
        self.providers
            .get(&source)
            .ok_or_else(|| EventHubError::Unsupported(format!("writing to {source}")))
    }

    async fn require(&self, key: &EventKey) -> EventHubResult<StoredEvent> {
        load_event(self.store.as_ref(), &self.user, &key.to_string())
            .await?
            .ok_or_else(|| EventHubError::UnknownEvent(key.to_string()))
    }

    async fn write(&self, ops: Vec<WriteOp>) -> EventHubResult<()> {
        self.store.batch_write(&self.user, ops).await
    }

    async fn event_from_draft(&self, draft: EventDraft) -> EventHubResult<UnifiedEvent> {
        let source = match draft.source {
            Some(source) => source,
            None => self
                .providers
                .keys()
                .copied()
                .min()
                .ok_or_else(|| EventHubError::Unsupported("creating events without providers".into()))?,
        };
        let calendar_id = draft.calendar_id.unwrap_or_else(|| "primary".to_string());
        let start = draft
            .start
            .ok_or_else(|| EventHubError::Validation("event needs a start".into()))?;
        let end = draft.end.unwrap_or(start + Duration::hours(1));

        // Borrow name and colour from an already known event of the same calendar
        let known = load_events(self.store.as_ref(), &self.user)
            .await?
            .into_iter()
            .find(|e| e.event.source == source && e.event.calendar_id == calendar_id);
        let (calendar_name, calendar_color) = match known {
            Some(e) => (e.event.calendar_name, e.event.calendar_color),
            None => (calendar_id.clone(), source.default_color().to_string()),
        };

        let event = UnifiedEvent {
            id: format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4().simple()),
            title: draft
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            start,
            end,
            is_all_day: draft.is_all_day,
            location: draft.location,
            description: draft.description,
            attendees: draft.attendees,
            organizer: draft.organizer,
            calendar_id,
            calendar_name,
            calendar_color,
            source,
            external_link: None,
            source_updated_at: None,
        };
        validate_times(&event)?;
        Ok(event)
    }

    /// Tell the user a local change was not confirmed. Only connectivity
    /// failures promise a sync on reconnect.
    async fn notify_unconfirmed(&self, kind: MutationKind, key: &EventKey, error: &EventHubError) {
        let message = match error {
            EventHubError::NetworkUnavailable(_) => {
                format!("Failed to {kind} event. Changes will sync when connection is restored.")
            }
            e if e.is_transient() => format!("Failed to {kind} event: {e}. It will be retried."),
            e => format!("Failed to {kind} event: {e}"),
        };
        self.notifier
            .emit(NotificationKind::SyncFailed, "Sync Failed", message, Some(key.to_string()))
            .await;
    }

    async fn notify_deleted(&self, key: &EventKey) {
        self.notifier
            .emit(
                NotificationKind::EventDeleted,
                "Event Deleted",
                "Event has been deleted",
                Some(key.to_string()),
            )
            .await;
    }
}

fn validate_times(event: &UnifiedEvent) -> EventHubResult<()> {
    validate_instant(event.start, "start")?;
    validate_instant(event.end, "end")?;
    if event.end < event.start {
        return Err(EventHubError::Validation("end is before start".into()));
    }
    Ok(())
}

fn status_update(key: &str, status: SyncStatus) -> EventHubResult<WriteOp> {
    Ok(WriteOp::update(
        Collection::Events,
        key,
        to_fields(&json!({ "syncStatus": status }))?,
    ))
}

/// Later values win.
fn merge_patch(base: &mut EventPatch, later: &EventPatch) {
    if later.title.is_some() {
        base.title = later.title.clone();
    }
    if later.start.is_some() {
        base.start = later.start;
    }
    if later.end.is_some() {
        base.end = later.end;
    }
    if later.is_all_day.is_some() {
        base.is_all_day = later.is_all_day;
    }
    if later.location.is_some() {
        base.location = later.location.clone();
    }
    if later.description.is_some() {
        base.description = later.description.clone();
    }
}
