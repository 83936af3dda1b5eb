//! Live event views derived from the store.
//!
//! The projector follows the user's event collection ordered by start time
//! and republishes it as two lists: `events` (confirmed, visible) and
//! `offline_events` (pending or failed). A listener error is surfaced on
//! `error` while the last good lists stay published.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{EventHubError, EventHubResult};
use crate::event::{StoredEvent, SyncStatus, UserId};
use crate::store::{Collection, Direction, Document, DocumentStore, Query};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventViews {
    pub visible: Vec<StoredEvent>,
    pub offline: Vec<StoredEvent>,
}

/// Split a start-ordered snapshot into the visible and offline lists.
pub fn partition(docs: &[Document]) -> EventViews {
    let mut views = EventViews::default();

    for doc in docs {
        let event: StoredEvent = match doc.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(id = %doc.id, error = %e, "Skipping malformed event document");
                continue;
            }
        };

        match event.sync_status {
            SyncStatus::Synced if !event.deleted_locally => views.visible.push(event),
            SyncStatus::Synced => {}
            SyncStatus::Pending | SyncStatus::Error => views.offline.push(event),
        }
    }

    views
}

pub struct RealtimeProjector {
    pub events: watch::Receiver<Vec<StoredEvent>>,
    pub offline_events: watch::Receiver<Vec<StoredEvent>>,
    pub error: watch::Receiver<Option<EventHubError>>,
    task: JoinHandle<()>,
}

impl RealtimeProjector {
    pub async fn start(store: Arc<dyn DocumentStore>, user: UserId) -> EventHubResult<Self> {
        let query = Query::collection(Collection::Events).order_by("start", Direction::Ascending);
        let mut subscription = store.subscribe(&user, query).await?;

        let (events_tx, events) = watch::channel(Vec::new());
        let (offline_tx, offline_events) = watch::channel(Vec::new());
        let (error_tx, error) = watch::channel(None);

        let task = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                match snapshot {
                    Ok(docs) => {
                        let views = partition(&docs);
                        debug!(
                            user = %user,
                            visible = views.visible.len(),
                            offline = views.offline.len(),
                            "Event snapshot"
                        );
                        events_tx.send_replace(views.visible);
                        offline_tx.send_replace(views.offline);
                        error_tx.send_replace(None);
                    }
                    Err(e) => {
                        warn!(user = %user, error = %e, "Event listener failed, keeping last snapshot");
                        error_tx.send_replace(Some(e));
                    }
                }
            }
            debug!(user = %user, "Event subscription closed");
        });

        Ok(RealtimeProjector {
            events,
            offline_events,
            error,
            task,
        })
    }

    /// Unsubscribe. The published lists keep their last values.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for RealtimeProjector {
    fn drop(&mut self) {
        self.task.abort();
    }
}
