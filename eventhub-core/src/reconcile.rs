//! Merge of a fresh provider snapshot into a user's stored event set.
//!
//! One pass is a single atomic batch: every stored event is first marked
//! `pending`, then every event of the snapshot is upserted `synced`. Events
//! that stay `pending` after the pass were not seen upstream. They are kept
//! until they have been missing from `stale_purge_after` complete passes.
//!
//! The batch carries a precondition for every document it was planned from.
//! A local mutation committed between the read and the write fails the batch
//! with `Conflict`, and the pass is planned again from the new state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{EventHubError, EventHubResult};
use crate::event::{EventKey, Source, StoredEvent, SyncStatus, UnifiedEvent, UserId};
use crate::store::{Collection, DocumentStore, WriteOp, load_events, to_fields};

/// Plans attempted before a pass gives up on a store that keeps changing underneath it
const MAX_PLAN_ATTEMPTS: usize = 3;

/// Everything one sync pass fetched.
#[derive(Debug, Clone, Default)]
pub struct FreshSnapshot {
    pub events: Vec<UnifiedEvent>,
    /// Sources whose calendars and events were all fetched without error.
    /// Only these count towards stale purging.
    pub complete_sources: HashSet<Source>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Upstream copies ignored in favour of a newer local edit
    pub kept_local: usize,
    /// Stored events missing from the snapshot, now pending
    pub stale: usize,
    pub purged: usize,
    pub duplicates: usize,
}

impl ReconcileReport {
    pub fn synced(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// The batch a pass will commit, with its summary.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub ops: Vec<WriteOp>,
    /// Preconditions on the documents `ops` was computed from
    pub guards: Vec<WriteOp>,
    pub report: ReconcileReport,
}

/// Fields every local mutation changes. Unchanged, they prove a document is
/// still the one the plan read.
fn guard(id: &str, stored: &StoredEvent) -> EventHubResult<WriteOp> {
    let fields = to_fields(&json!({
        "version": stored.version,
        "syncStatus": stored.sync_status,
        "localEditAt": stored.local_edit_at,
    }))?;
    Ok(WriteOp::expect(Collection::Events, id, fields))
}

/// Compute the batch merging `fresh` into `existing`.
pub fn plan(
    user: &UserId,
    existing: &[StoredEvent],
    fresh: &FreshSnapshot,
    now: DateTime<Utc>,
    stale_purge_after: u32,
) -> EventHubResult<ReconcilePlan> {
    let mut result = ReconcilePlan::default();
    let report = &mut result.report;

    // The same event can be listed by two calendars of one account; first one wins
    let mut fresh_by_key: HashMap<EventKey, &UnifiedEvent> = HashMap::new();
    for event in &fresh.events {
        if fresh_by_key.contains_key(&event.key()) {
            report.duplicates += 1;
            continue;
        }
        fresh_by_key.insert(event.key(), event);
    }

    let mut stored_by_key: HashMap<EventKey, &StoredEvent> = HashMap::new();
    for stored in existing {
        match stored_by_key.get(&stored.key()) {
            Some(current) if current.wins_over(stored) => {}
            _ => {
                stored_by_key.insert(stored.key(), stored);
            }
        }
    }

    // Mark step
    for (key, stored) in &stored_by_key {
        if fresh_by_key.contains_key(key) || stored.sync_status == SyncStatus::Error {
            continue;
        }

        result.guards.push(guard(&key.to_string(), stored)?);
        let counts = !stored.event.is_local_only() && fresh.complete_sources.contains(&key.source);
        let cycles = if counts {
            stored.pending_cycles + 1
        } else {
            stored.pending_cycles
        };

        if counts && stale_purge_after > 0 && cycles >= stale_purge_after && !stored.has_local_edit()
        {
            debug!(key = %key, cycles, "Purging event missing upstream");
            result.ops.push(WriteOp::delete(Collection::Events, key.to_string()));
            report.purged += 1;
            continue;
        }

        let marks = json!({
            "syncStatus": SyncStatus::Pending,
            "lastSyncAt": now,
            "pendingCycles": cycles,
        });
        result.ops.push(WriteOp::Set {
            collection: Collection::Events,
            id: key.to_string(),
            data: to_fields(&marks)?,
            merge: true,
        });
        if !stored.event.is_local_only() && !stored.has_local_edit() {
            report.stale += 1;
        }
    }

    // Merge step
    for (key, upstream) in &fresh_by_key {
        let Some(stored) = stored_by_key.get(key) else {
            result
                .guards
                .push(WriteOp::expect_absent(Collection::Events, key.to_string()));
            let created = StoredEvent {
                event: (*upstream).clone(),
                user_id: user.to_string(),
                sync_status: SyncStatus::Synced,
                version: 1,
                last_sync_at: now,
                created_at: now,
                updated_at: now,
                local_edit_at: None,
                deleted_locally: false,
                pending_cycles: 0,
            };
            result
                .ops
                .push(WriteOp::set(Collection::Events, key.to_string(), &created)?);
            report.created += 1;
            continue;
        };

        if stored.local_edit_is_newer_than(upstream) {
            report.kept_local += 1;
            if stored.sync_status == SyncStatus::Error {
                continue;
            }
            result.guards.push(guard(&key.to_string(), stored)?);
            let marks = json!({
                "syncStatus": SyncStatus::Pending,
                "lastSyncAt": now,
                "pendingCycles": 0,
            });
            result.ops.push(WriteOp::Set {
                collection: Collection::Events,
                id: key.to_string(),
                data: to_fields(&marks)?,
                merge: true,
            });
            continue;
        }

        result.guards.push(guard(&key.to_string(), stored)?);
        let changed = stored.event != **upstream || stored.deleted_locally;
        let merged = StoredEvent {
            event: (*upstream).clone(),
            user_id: user.to_string(),
            sync_status: SyncStatus::Synced,
            version: if changed { stored.version + 1 } else { stored.version },
            last_sync_at: now,
            created_at: stored.created_at,
            updated_at: if changed { now } else { stored.updated_at },
            local_edit_at: None,
            deleted_locally: false,
            pending_cycles: 0,
        };
        result
            .ops
            .push(WriteOp::set(Collection::Events, key.to_string(), &merged)?);

        if changed {
            report.updated += 1;
        } else {
            report.unchanged += 1;
        }
    }

    Ok(result)
}

/// Applies snapshots to the store of one engine.
pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    stale_purge_after: u32,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>, stale_purge_after: u32) -> Self {
        Reconciler {
            store,
            stale_purge_after,
        }
    }

    /// Merge `fresh` into the user's events in one batch. A failed commit
    /// leaves the previous state untouched and is reported as `StoreCommit`.
    /// Documents changed locally while the pass was planned are re-read, so a
    /// newer local edit is never overwritten by the upstream copy.
    pub async fn reconcile(
        &self,
        user: &UserId,
        fresh: &FreshSnapshot,
        now: DateTime<Utc>,
    ) -> EventHubResult<ReconcileReport> {
        for attempt in 1..=MAX_PLAN_ATTEMPTS {
            let existing = load_events(self.store.as_ref(), user).await?;
            let ReconcilePlan { ops, guards, report } =
                plan(user, &existing, fresh, now, self.stale_purge_after)?;

            if ops.is_empty() {
                debug!(user = %user, "Nothing to reconcile");
                return Ok(report);
            }

            let batch = guards.into_iter().chain(ops).collect();
            match self.store.batch_write(user, batch).await {
                Ok(()) => {
                    info!(
                        user = %user,
                        created = report.created,
                        updated = report.updated,
                        unchanged = report.unchanged,
                        kept_local = report.kept_local,
                        stale = report.stale,
                        purged = report.purged,
                        "Reconciled snapshot"
                    );
                    return Ok(report);
                }
                Err(EventHubError::Conflict(doc)) => {
                    debug!(user = %user, attempt, doc = %doc, "Event changed during reconcile, planning again");
                }
                Err(e) => {
                    let e = match e {
                        EventHubError::StoreCommit(_) => e,
                        other => EventHubError::StoreCommit(other.to_string()),
                    };
                    warn!(user = %user, error = %e, "Reconcile commit failed");
                    return Err(e);
                }
            }
        }

        let e = EventHubError::StoreCommit(format!(
            "events kept changing during {MAX_PLAN_ATTEMPTS} reconcile attempts"
        ));
        warn!(user = %user, error = %e, "Reconcile commit failed");
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GOOGLE_DEFAULT_COLOR;
    use crate::store::{Document, MemoryStore, Query, Subscription, load_event};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn event(source: Source, id: &str, title: &str) -> UnifiedEvent {
        UnifiedEvent {
            id: id.to_string(),
            title: title.to_string(),
            start: Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 20, 10, 0, 0).unwrap(),
            is_all_day: false,
            location: None,
            description: None,
            attendees: vec![],
            organizer: None,
            calendar_id: "primary".to_string(),
            calendar_name: "Work".to_string(),
            calendar_color: GOOGLE_DEFAULT_COLOR.to_string(),
            source,
            external_link: None,
            source_updated_at: Some(t0() - Duration::days(1)),
        }
    }

    fn snapshot(events: Vec<UnifiedEvent>) -> FreshSnapshot {
        FreshSnapshot {
            events,
            complete_sources: Source::ALL.into_iter().collect(),
        }
    }

    fn reconciler(store: &Arc<MemoryStore>, purge_after: u32) -> Reconciler {
        Reconciler::new(store.clone(), purge_after)
    }

    async fn stored(store: &Arc<MemoryStore>, key: &str) -> Option<StoredEvent> {
        load_event(store.as_ref(), &user(), key).await.unwrap()
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 3);
        let fresh = snapshot(vec![
            event(Source::Google, "a", "Standup"),
            event(Source::Microsoft, "b", "Review"),
        ]);

        r.reconcile(&user(), &fresh, t0()).await.unwrap();
        let first = load_events(store.as_ref(), &user()).await.unwrap();
        let report = r.reconcile(&user(), &fresh, t0()).await.unwrap();
        let second = load_events(store.as_ref(), &user()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(report.unchanged, 2);
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|e| e.version == 1));
    }

    #[tokio::test]
    async fn changed_content_bumps_version() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 3);
        r.reconcile(&user(), &snapshot(vec![event(Source::Google, "a", "Standup")]), t0())
            .await
            .unwrap();
        let report = r
            .reconcile(&user(), &snapshot(vec![event(Source::Google, "a", "Daily")]), t0())
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        let doc = stored(&store, "google:a").await.unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.event.title, "Daily");
    }

    #[tokio::test]
    async fn missing_events_are_marked_pending_not_deleted() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 3);
        r.reconcile(
            &user(),
            &snapshot(vec![
                event(Source::Google, "e1", "One"),
                event(Source::Google, "e2", "Two"),
            ]),
            t0(),
        )
        .await
        .unwrap();

        let report = r
            .reconcile(&user(), &snapshot(vec![event(Source::Google, "e1", "One")]), t0())
            .await
            .unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(stored(&store, "google:e1").await.unwrap().sync_status, SyncStatus::Synced);
        let e2 = stored(&store, "google:e2").await.unwrap();
        assert_eq!(e2.sync_status, SyncStatus::Pending);
        assert_eq!(e2.pending_cycles, 1);
    }

    #[tokio::test]
    async fn stale_events_are_purged_after_configured_passes() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 2);
        r.reconcile(&user(), &snapshot(vec![event(Source::Google, "e2", "Two")]), t0())
            .await
            .unwrap();

        r.reconcile(&user(), &snapshot(vec![]), t0()).await.unwrap();
        assert!(stored(&store, "google:e2").await.is_some());

        let report = r.reconcile(&user(), &snapshot(vec![]), t0()).await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(stored(&store, "google:e2").await.is_none());
    }

    #[tokio::test]
    async fn incomplete_source_does_not_advance_stale_count() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 1);
        r.reconcile(&user(), &snapshot(vec![event(Source::Microsoft, "m1", "Sync")]), t0())
            .await
            .unwrap();

        let partial = FreshSnapshot {
            events: vec![],
            complete_sources: [Source::Google].into_iter().collect(),
        };
        let report = r.reconcile(&user(), &partial, t0()).await.unwrap();

        assert_eq!(report.purged, 0);
        let m1 = stored(&store, "microsoft:m1").await.unwrap();
        assert_eq!(m1.sync_status, SyncStatus::Pending);
        assert_eq!(m1.pending_cycles, 0);
    }

    #[tokio::test]
    async fn reappearing_event_resets_stale_count() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 5);
        let fresh = snapshot(vec![event(Source::Google, "e1", "One")]);
        r.reconcile(&user(), &fresh, t0()).await.unwrap();
        r.reconcile(&user(), &snapshot(vec![]), t0()).await.unwrap();
        r.reconcile(&user(), &fresh, t0()).await.unwrap();

        let e1 = stored(&store, "google:e1").await.unwrap();
        assert_eq!(e1.sync_status, SyncStatus::Synced);
        assert_eq!(e1.pending_cycles, 0);
        assert_eq!(e1.version, 1);
    }

    #[test]
    fn newer_local_edit_survives_upstream_copy() {
        let mut local = StoredEvent {
            event: event(Source::Google, "a", "Renamed offline"),
            user_id: "u1".into(),
            sync_status: SyncStatus::Pending,
            version: 2,
            last_sync_at: t0(),
            created_at: t0(),
            updated_at: t0(),
            local_edit_at: Some(t0()),
            deleted_locally: false,
            pending_cycles: 0,
        };
        let upstream = event(Source::Google, "a", "Original");

        let result = plan(&user(), &[local.clone()], &snapshot(vec![upstream.clone()]), t0(), 3)
            .unwrap();
        assert_eq!(result.report.kept_local, 1);
        match &result.ops[..] {
            [WriteOp::Set { data, merge, .. }] => {
                assert!(*merge);
                assert_eq!(data["syncStatus"], "pending");
                assert!(data.get("title").is_none());
            }
            other => panic!("unexpected ops {other:?}"),
        }

        // Upstream edited after the local change: upstream wins
        local.local_edit_at = Some(t0() - Duration::days(2));
        let result = plan(&user(), &[local], &snapshot(vec![upstream]), t0(), 3).unwrap();
        assert_eq!(result.report.updated, 1);
    }

    #[test]
    fn error_documents_are_not_marked() {
        let failed = StoredEvent {
            event: event(Source::Google, "x", "Failed write"),
            user_id: "u1".into(),
            sync_status: SyncStatus::Error,
            version: 1,
            last_sync_at: t0(),
            created_at: t0(),
            updated_at: t0(),
            local_edit_at: Some(t0()),
            deleted_locally: false,
            pending_cycles: 0,
        };
        let result = plan(&user(), &[failed], &snapshot(vec![]), t0(), 1).unwrap();
        assert!(result.ops.is_empty());
    }

    #[test]
    fn duplicate_keys_in_snapshot_are_collapsed() {
        let mut shared = event(Source::Google, "a", "Shared");
        let fresh = snapshot(vec![shared.clone(), {
            shared.calendar_id = "team".into();
            shared
        }]);
        let result = plan(&user(), &[], &fresh, t0(), 3).unwrap();
        assert_eq!(result.report.created, 1);
        assert_eq!(result.report.duplicates, 1);
        assert_eq!(result.ops.len(), 1);
    }

    /// Commits a queued local edit right after handing out an events read,
    /// as if the user changed an event while the pass was being planned.
    struct EditAfterRead {
        inner: MemoryStore,
        edit: Mutex<Option<StoredEvent>>,
    }

    #[async_trait]
    impl DocumentStore for EditAfterRead {
        async fn get_all(&self, user: &UserId, collection: Collection) -> EventHubResult<Vec<Document>> {
            let docs = self.inner.get_all(user, collection).await?;
            let edit = self.edit.lock().unwrap().take();
            if let Some(edit) = edit {
                let op = WriteOp::set(Collection::Events, edit.key().to_string(), &edit)?;
                self.inner.batch_write(user, vec![op]).await?;
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

    #[tokio::test]
    async fn local_edit_during_pass_is_not_overwritten() {
        let store = Arc::new(EditAfterRead {
            inner: MemoryStore::new(),
            edit: Mutex::new(None),
        });
        let r = Reconciler::new(store.clone(), 3);
        let fresh = snapshot(vec![event(Source::Google, "g1", "Standup")]);
        r.reconcile(&user(), &fresh, t0()).await.unwrap();

        let mut renamed = load_event(&store.inner, &user(), "google:g1").await.unwrap().unwrap();
        renamed.event.title = "Local rename".into();
        renamed.version += 1;
        renamed.sync_status = SyncStatus::Pending;
        renamed.local_edit_at = Some(t0());
        *store.edit.lock().unwrap() = Some(renamed);

        let report = r.reconcile(&user(), &fresh, t0()).await.unwrap();

        assert_eq!(report.kept_local, 1);
        assert_eq!(report.unchanged, 0);
        let g1 = load_event(&store.inner, &user(), "google:g1").await.unwrap().unwrap();
        assert_eq!(g1.event.title, "Local rename");
        assert_eq!(g1.sync_status, SyncStatus::Pending);
        assert_eq!(g1.version, 2);
        assert_eq!(g1.local_edit_at, Some(t0()));
    }

    #[test]
    fn plan_guards_every_document_it_writes() {
        let existing = StoredEvent {
            event: event(Source::Google, "a", "Standup"),
            user_id: "u1".into(),
            sync_status: SyncStatus::Synced,
            version: 4,
            last_sync_at: t0(),
            created_at: t0(),
            updated_at: t0(),
            local_edit_at: None,
            deleted_locally: false,
            pending_cycles: 0,
        };
        let fresh = snapshot(vec![
            event(Source::Google, "a", "Standup"),
            event(Source::Google, "b", "New"),
        ]);
        let result = plan(&user(), &[existing], &fresh, t0(), 3).unwrap();

        assert_eq!(result.ops.len(), 2);
        assert!(result.guards.contains(&WriteOp::expect_absent(Collection::Events, "google:b")));
        let guarded_a = result.guards.iter().find_map(|op| match op {
            WriteOp::Expect { id, fields: Some(fields), .. } if id == "google:a" => Some(fields),
            _ => None,
        });
        let fields = guarded_a.unwrap();
        assert_eq!(fields["version"], 4);
        assert_eq!(fields["syncStatus"], "synced");
        assert!(fields["localEditAt"].is_null());
    }

    #[tokio::test]
    async fn failed_commit_keeps_previous_state() {
        let store = Arc::new(MemoryStore::new());
        let r = reconciler(&store, 3);
        r.reconcile(&user(), &snapshot(vec![event(Source::Google, "a", "One")]), t0())
            .await
            .unwrap();

        store.fail_next_commit("quota exceeded").await;
        let result = r.reconcile(&user(), &snapshot(vec![]), t0()).await;

        assert!(matches!(result, Err(EventHubError::StoreCommit(_))));
        assert_eq!(stored(&store, "google:a").await.unwrap().sync_status, SyncStatus::Synced);
    }
}
