//! Short-lived notifications about sync and mutation outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{EventHubError, EventHubResult};
use crate::event::UserId;
use crate::store::{Collection, Direction, DocumentStore, Query, WriteOp, decode_all, to_fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EventAdded,
    EventUpdated,
    EventDeleted,
    SyncCompleted,
    SyncFailed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::EventAdded => "event_added",
            NotificationKind::EventUpdated => "event_updated",
            NotificationKind::EventDeleted => "event_deleted",
            NotificationKind::SyncCompleted => "sync_completed",
            NotificationKind::SyncFailed => "sync_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Key of the event the notification is about, for "jump to event"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Non-expired notifications, newest first.
pub fn active_notifications(all: &[Notification], now: DateTime<Utc>) -> Vec<Notification> {
    let mut active: Vec<Notification> = all.iter().filter(|n| !n.is_expired(now)).cloned().collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    active
}

pub fn unread_count(active: &[Notification]) -> usize {
    active.iter().filter(|n| !n.read).count()
}

/// Writes and manages one user's notifications.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn DocumentStore>,
    user: UserId,
    ttl: chrono::Duration,
}

impl Notifier {
    pub fn new(store: Arc<dyn DocumentStore>, user: UserId, ttl: Duration) -> Self {
        Notifier {
            store,
            user,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)),
        }
    }

    pub async fn show_notification(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        event_id: Option<String>,
    ) -> EventHubResult<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            event_id,
            user_id: self.user.to_string(),
            read: false,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.store
            .batch_write(
                &self.user,
                vec![WriteOp::set(
                    Collection::Notifications,
                    notification.id.clone(),
                    &notification,
                )?],
            )
            .await?;

        debug!(user = %self.user, kind = %kind, title = %notification.title, "Notification created");
        Ok(notification)
    }

    /// Like `show_notification`, for callers whose own outcome must not depend on it.
    pub async fn emit(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        event_id: Option<String>,
    ) {
        if let Err(e) = self.show_notification(kind, title, message, event_id).await {
            warn!(user = %self.user, kind = %kind, error = %e, "Could not store notification");
        }
    }

    pub async fn all(&self) -> EventHubResult<Vec<Notification>> {
        let docs = self.store.get_all(&self.user, Collection::Notifications).await?;
        decode_all(&docs)
    }

    pub async fn active(&self, now: DateTime<Utc>) -> EventHubResult<Vec<Notification>> {
        Ok(active_notifications(&self.all().await?, now))
    }

    pub async fn mark_as_read(&self, id: &str) -> EventHubResult<()> {
        if self
            .store
            .get(&self.user, Collection::Notifications, id)
            .await?
            .is_none()
        {
            return Err(EventHubError::NotFound(format!("notification {id}")));
        }

        self.store
            .batch_write(
                &self.user,
                vec![WriteOp::update(
                    Collection::Notifications,
                    id,
                    to_fields(&json!({ "read": true }))?,
                )],
            )
            .await
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_as_read(&self) -> EventHubResult<usize> {
        let unread: Vec<Notification> = self.all().await?.into_iter().filter(|n| !n.read).collect();
        if unread.is_empty() {
            return Ok(0);
        }

        let read = to_fields(&json!({ "read": true }))?;
        let ops = unread
            .iter()
            .map(|n| WriteOp::update(Collection::Notifications, n.id.clone(), read.clone()))
            .collect();
        self.store.batch_write(&self.user, ops).await?;
        Ok(unread.len())
    }

    pub async fn delete_notification(&self, id: &str) -> EventHubResult<()> {
        self.store
            .batch_write(
                &self.user,
                vec![WriteOp::delete(Collection::Notifications, id)],
            )
            .await
    }

    pub async fn clear_all_notifications(&self) -> EventHubResult<usize> {
        let docs = self.store.get_all(&self.user, Collection::Notifications).await?;
        self.delete_docs(docs.into_iter().map(|d| d.id).collect()).await
    }

    /// Delete notifications whose TTL has passed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> EventHubResult<usize> {
        let expired = self
            .all()
            .await?
            .into_iter()
            .filter(|n| n.is_expired(now))
            .map(|n| n.id)
            .collect();
        self.delete_docs(expired).await
    }

    async fn delete_docs(&self, ids: Vec<String>) -> EventHubResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();
        let ops = ids
            .into_iter()
            .map(|id| WriteOp::delete(Collection::Notifications, id))
            .collect();
        self.store.batch_write(&self.user, ops).await?;
        Ok(count)
    }
}

/// Live view of the active notifications and the derived unread count.
pub struct NotificationFeed {
    pub notifications: watch::Receiver<Vec<Notification>>,
    pub unread_count: watch::Receiver<usize>,
    pub error: watch::Receiver<Option<EventHubError>>,
    task: JoinHandle<()>,
}

impl NotificationFeed {
    /// Subscribe to the user's notifications. Expiry is re-evaluated every
    /// `refresh` even when the store does not change.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        user: UserId,
        refresh: Duration,
    ) -> EventHubResult<Self> {
        let query =
            Query::collection(Collection::Notifications).order_by("createdAt", Direction::Descending);
        let mut subscription = store.subscribe(&user, query).await?;

        let (list_tx, notifications) = watch::channel(Vec::new());
        let (count_tx, unread_rx) = watch::channel(0);
        let (error_tx, error) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut all: Vec<Notification> = Vec::new();
            let mut ticker = tokio::time::interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    next = subscription.next() => match next {
                        Some(Ok(docs)) => match decode_all::<Notification>(&docs) {
                            Ok(decoded) => {
                                all = decoded;
                                error_tx.send_replace(None);
                            }
                            Err(e) => {
                                warn!(user = %user, error = %e, "Malformed notification snapshot");
                                error_tx.send_replace(Some(e));
                                continue;
                            }
                        },
                        Some(Err(e)) => {
                            warn!(user = %user, error = %e, "Notification listener failed");
                            error_tx.send_replace(Some(e));
                            continue;
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {}
                }

                let active = active_notifications(&all, Utc::now());
                let unread = unread_count(&active);
                list_tx.send_if_modified(|current| {
                    if *current == active {
                        return false;
                    }
                    *current = active;
                    true
                });
                count_tx.send_if_modified(|current| {
                    let changed = *current != unread;
                    *current = unread;
                    changed
                });
            }
        });

        Ok(NotificationFeed {
            notifications,
            unread_count: unread_rx,
            error,
            task,
        })
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
