//! One signed-in user's engine.
//!
//! `EventHub` wires the orchestrator, projector, offline queue, notifier and
//! connectivity tracking together and is the only surface consumers need.
//! Everything it owns is torn down by `shutdown`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connectivity::Connectivity;
use crate::credentials::CredentialProvider;
use crate::error::EventHubResult;
use crate::event::{EventDraft, EventKey, EventPatch, StoredEvent, UnifiedCalendar, UserId};
use crate::notifier::{Notification, NotificationFeed, Notifier};
use crate::orchestrator::{SyncOrchestrator, SyncOutcome, SyncState};
use crate::projector::RealtimeProjector;
use crate::provider::CalendarProvider;
use crate::queue::{OfflineQueue, ReplayReport, SyncQueueItem};
use crate::scheduler::spawn_scheduler;
use crate::search::{SearchFilters, SearchStats};
use crate::store::DocumentStore;

/// Interval at which notification expiry is re-evaluated without store changes.
const NOTIFICATION_REFRESH: Duration = Duration::from_secs(60);

/// Session state passed in explicitly instead of read from globals.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: UserId,
    pub online: bool,
}

impl SessionContext {
    pub fn new(user_id: UserId) -> Self {
        SessionContext {
            user_id,
            online: true,
        }
    }
}

pub struct EventHub {
    user: UserId,
    config: EngineConfig,
    orchestrator: Arc<SyncOrchestrator>,
    queue: Arc<OfflineQueue>,
    notifier: Notifier,
    connectivity: Arc<Connectivity>,
    projector: RealtimeProjector,
    feed: NotificationFeed,
    shutdown: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl EventHub {
    pub async fn start(
        context: SessionContext,
        store: Arc<dyn DocumentStore>,
        providers: Vec<Arc<dyn CalendarProvider>>,
        credentials: Arc<dyn CredentialProvider>,
        config: EngineConfig,
    ) -> EventHubResult<Self> {
        config.validate()?;
        let user = context.user_id;

        let connectivity = Arc::new(Connectivity::new(context.online));
        let notifier = Notifier::new(store.clone(), user.clone(), config.notification_ttl);

        let orchestrator = Arc::new(SyncOrchestrator::new(
            user.clone(),
            store.clone(),
            providers.clone(),
            credentials.clone(),
            notifier.clone(),
            config.clone(),
        )?);
        let queue = Arc::new(OfflineQueue::new(
            user.clone(),
            store.clone(),
            providers,
            credentials,
            notifier.clone(),
            config.clone(),
            connectivity.subscribe(),
        )?);

        let projector = RealtimeProjector::start(store.clone(), user.clone()).await?;
        let feed = NotificationFeed::start(store, user.clone(), NOTIFICATION_REFRESH).await?;

        info!(user = %user, online = context.online, "Session started");

        Ok(EventHub {
            user,
            config,
            orchestrator,
            queue,
            notifier,
            connectivity,
            projector,
            feed,
            shutdown: watch::Sender::new(false),
            scheduler: Mutex::new(None),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Start the periodic sync, which runs a first pass immediately.
    pub fn spawn_scheduler(&self) {
        let Ok(mut slot) = self.scheduler.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        *slot = Some(spawn_scheduler(
            self.orchestrator.clone(),
            self.notifier.clone(),
            self.config.sync_interval,
            self.shutdown.subscribe(),
        ));
    }

    pub async fn refresh_events(&self) -> EventHubResult<SyncOutcome> {
        self.orchestrator.refresh().await
    }

    pub async fn add_event(&self, draft: EventDraft) -> EventHubResult<StoredEvent> {
        self.queue.add_event(draft).await
    }

    pub async fn update_event(&self, key: &EventKey, patch: EventPatch) -> EventHubResult<StoredEvent> {
        self.queue.update_event(key, patch).await
    }

    /// Returns true when the provider confirmed the delete.
    pub async fn delete_event(&self, key: &EventKey) -> EventHubResult<bool> {
        self.queue.delete_event(key).await
    }

    pub async fn sync_offline_events(&self) -> EventHubResult<ReplayReport> {
        self.queue.sync_offline_events().await
    }

    pub async fn retry_failed_mutations(&self) -> EventHubResult<usize> {
        let reset = self.queue.retry_failed_mutations().await?;
        if reset > 0 && self.connectivity.is_online() {
            self.queue.sync_offline_events().await?;
        }
        Ok(reset)
    }

    pub async fn pending_mutations(&self) -> EventHubResult<Vec<SyncQueueItem>> {
        self.queue.pending_items().await
    }

    /// Report a connectivity change. Coming back online replays the offline
    /// queue once the state has been stable for `reconnect_debounce`.
    pub fn set_online(&self, online: bool) {
        let Some(generation) = self.connectivity.set_online(online) else {
            return;
        };

        let connectivity = self.connectivity.clone();
        let queue = self.queue.clone();
        let orchestrator = self.orchestrator.clone();
        let shutdown = self.shutdown.subscribe();
        let debounce = self.config.reconnect_debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if *shutdown.borrow() || !connectivity.is_current(generation) {
                debug!(generation, "Reconnect superseded, skipping replay");
                return;
            }

            let has_pending = match queue.pending_items().await {
                Ok(items) => items.iter().any(|i| !i.terminal),
                Err(e) => {
                    warn!(error = %e, "Could not read offline queue");
                    return;
                }
            };
            if !has_pending {
                return;
            }

            match queue.sync_offline_events().await {
                Ok(report) => debug!(succeeded = report.succeeded, "Reconnect replay finished"),
                Err(e) => warn!(error = %e, "Reconnect replay failed"),
            }
            if let Err(e) = orchestrator.refresh().await {
                warn!(error = %e, "Reconnect sync failed");
            }
        });
    }

    pub fn is_online(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    pub fn events(&self) -> watch::Receiver<Vec<StoredEvent>> {
        self.projector.events.clone()
    }

    pub fn offline_events(&self) -> watch::Receiver<Vec<StoredEvent>> {
        self.projector.offline_events.clone()
    }

    pub fn calendars(&self) -> watch::Receiver<Vec<UnifiedCalendar>> {
        self.orchestrator.calendars()
    }

    pub fn notifications(&self) -> watch::Receiver<Vec<Notification>> {
        self.feed.notifications.clone()
    }

    pub fn unread_count(&self) -> watch::Receiver<usize> {
        self.feed.unread_count.clone()
    }

    pub fn last_sync_time(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.orchestrator.last_sync_time()
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.orchestrator.state()
    }

    pub fn sync_in_progress(&self) -> watch::Receiver<bool> {
        self.orchestrator.sync_in_progress()
    }

    /// Listener errors of the event view, if any.
    pub fn events_error(&self) -> watch::Receiver<Option<crate::error::EventHubError>> {
        self.projector.error.clone()
    }

    /// Visible events matching `filters`, with statistics over the visible set.
    pub fn search(&self, filters: &SearchFilters) -> (Vec<StoredEvent>, SearchStats) {
        let visible = self.projector.events.borrow().clone();
        let matched: Vec<&StoredEvent> = visible.iter().filter(|e| filters.matches(&e.event)).collect();
        let stats = SearchStats::compute(
            visible.len(),
            &matched.iter().map(|e| &e.event).collect::<Vec<_>>(),
        );
        (matched.into_iter().cloned().collect(), stats)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Stop timers and subscriptions. A sync pass still running finishes its
    /// requests, but its results are dropped.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        self.orchestrator.close();
        self.projector.stop();
        self.feed.stop();

        let scheduler = self.scheduler.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }

        info!(user = %self.user, "Session closed");
    }
}
