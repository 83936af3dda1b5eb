//! Sync passes: fetch from every provider, normalize, reconcile.
//!
//! At most one pass runs at a time. A refresh requested while a pass is in
//! flight is coalesced into it and returns immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::credentials::CredentialProvider;
use crate::date_range::SyncWindow;
use crate::error::{EventHubError, EventHubResult};
use crate::event::{Source, UnifiedCalendar, UnifiedEvent, UserId};
use crate::normalize::Normalizer;
use crate::notifier::{NotificationKind, Notifier};
use crate::provider::CalendarProvider;
use crate::reconcile::{FreshSnapshot, ReconcileReport, Reconciler};
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Idle,
    Syncing,
    /// Idle after a pass that failed or had failing sources
    IdleWithError(String),
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// What one provider contributed to a pass.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Source,
    pub calendars: usize,
    pub events: usize,
    /// Events skipped for invalid dates
    pub rejected: usize,
    /// Events dropped by the birthday filter
    pub filtered: usize,
    pub error: Option<EventHubError>,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub reconcile: ReconcileReport,
}

impl SyncReport {
    pub fn events(&self) -> usize {
        self.sources.iter().map(|s| s.events).sum()
    }

    pub fn calendars(&self) -> usize {
        self.sources.iter().map(|s| s.calendars).sum()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was already in flight
    Coalesced,
    /// The engine shut down while the pass was running; its results were dropped
    Discarded,
}

struct SourceFetch {
    report: SourceReport,
    calendars: Vec<UnifiedCalendar>,
    events: Vec<UnifiedEvent>,
    complete: bool,
}

impl SourceFetch {
    fn failed(source: Source, error: EventHubError) -> Self {
        SourceFetch {
            report: SourceReport {
                source,
                calendars: 0,
                events: 0,
                rejected: 0,
                filtered: 0,
                error: Some(error),
            },
            calendars: Vec::new(),
            events: Vec::new(),
            complete: false,
        }
    }
}

/// Clears the in-flight flag and its published copy however the pass ends.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    published: &'a watch::Sender<bool>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.published.send_replace(false);
    }
}

pub struct SyncOrchestrator {
    user: UserId,
    providers: Vec<Arc<dyn CalendarProvider>>,
    credentials: Arc<dyn CredentialProvider>,
    normalizer: Normalizer,
    reconciler: Reconciler,
    notifier: Notifier,
    config: EngineConfig,
    in_flight: AtomicBool,
    closed: AtomicBool,
    in_progress: watch::Sender<bool>,
    state: watch::Sender<SyncState>,
    last_sync: watch::Sender<Option<DateTime<Utc>>>,
    calendars: watch::Sender<Vec<UnifiedCalendar>>,
}

impl SyncOrchestrator {
    pub fn new(
        user: UserId,
        store: Arc<dyn DocumentStore>,
        providers: Vec<Arc<dyn CalendarProvider>>,
        credentials: Arc<dyn CredentialProvider>,
        notifier: Notifier,
        config: EngineConfig,
    ) -> EventHubResult<Self> {
        let normalizer = Normalizer::new(config.tz()?);
        let reconciler = Reconciler::new(store, config.stale_purge_after);

        Ok(SyncOrchestrator {
            user,
            providers,
            credentials,
            normalizer,
            reconciler,
            notifier,
            config,
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            in_progress: watch::Sender::new(false),
            state: watch::Sender::new(SyncState::Idle),
            last_sync: watch::Sender::new(None),
            calendars: watch::Sender::new(Vec::new()),
        })
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn last_sync_time(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_sync.subscribe()
    }

    pub fn calendars(&self) -> watch::Receiver<Vec<UnifiedCalendar>> {
        self.calendars.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// True while a pass is running.
    pub fn sync_in_progress(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    /// Stop accepting passes. A pass still in flight finishes its I/O but commits nothing.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run one sync pass unless one is already running.
    ///
    /// Provider failures are isolated: the pass reconciles whatever the healthy
    /// providers returned. It fails only when the reconcile commit fails.
    pub async fn refresh(&self) -> EventHubResult<SyncOutcome> {
        if self.is_closed() {
            return Ok(SyncOutcome::Discarded);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(user = %self.user, "Sync already in flight, coalescing");
            return Ok(SyncOutcome::Coalesced);
        }
        let _in_flight = InFlight {
            flag: &self.in_flight,
            published: &self.in_progress,
        };
        self.in_progress.send_replace(true);

        self.state.send_replace(SyncState::Syncing);
        let started_at = Utc::now();
        let window = self.config.window(started_at);

        debug!(user = %self.user, providers = self.providers.len(), "Sync started");

        // A source without a credential is a failed source of the pass, so the
        // user is told to link it again
        let fetches = join_all(
            self.providers
                .iter()
                .map(|p| self.fetch_source(p.as_ref(), &window)),
        )
        .await;

        if self.is_closed() {
            debug!(user = %self.user, "Session closed during sync, discarding results");
            self.state.send_replace(SyncState::Idle);
            return Ok(SyncOutcome::Discarded);
        }

        let mut snapshot = FreshSnapshot::default();
        let mut calendars = Vec::new();
        let mut sources = Vec::new();
        for fetch in fetches {
            if fetch.complete {
                snapshot.complete_sources.insert(fetch.report.source);
            }
            snapshot.events.extend(fetch.events);
            calendars.extend(fetch.calendars);
            sources.push(fetch.report);
        }

        for failed in sources.iter().filter(|s| s.error.is_some()) {
            if let Some(error) = &failed.error {
                warn!(user = %self.user, source = %failed.source, error = %error, "Source sync failed");
                let message = if error.needs_reauth() {
                    format!("{} sync failed: {error}. Link the account again to resume syncing", failed.source)
                } else {
                    format!("{} sync failed: {error}", failed.source)
                };
                self.notifier
                    .emit(NotificationKind::SyncFailed, "Sync Failed", message, None)
                    .await;
            }
        }

        // Nothing came back at all: keep the stored set as it is
        let any_succeeded = sources.iter().any(|s| s.error.is_none() || s.calendars > 0);
        if !any_succeeded {
            self.state.send_replace(if sources.is_empty() {
                SyncState::Idle
            } else {
                SyncState::IdleWithError("All calendar sources failed".to_string())
            });
            return Ok(SyncOutcome::Completed(SyncReport {
                started_at,
                finished_at: Utc::now(),
                sources,
                reconcile: ReconcileReport::default(),
            }));
        }

        let reconcile = match self.reconciler.reconcile(&self.user, &snapshot, started_at).await {
            Ok(report) => report,
            Err(e) => {
                self.state.send_replace(SyncState::IdleWithError(e.to_string()));
                self.notifier
                    .emit(NotificationKind::SyncFailed, "Sync Failed", e.to_string(), None)
                    .await;
                return Err(e);
            }
        };

        let report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            sources,
            reconcile,
        };

        self.last_sync.send_replace(Some(report.finished_at));
        self.calendars.send_replace(calendars);

        let failed: Vec<String> = report.failed_sources().map(|s| s.source.to_string()).collect();
        self.state.send_replace(if failed.is_empty() {
            SyncState::Idle
        } else {
            SyncState::IdleWithError(format!("Failed sources: {}", failed.join(", ")))
        });

        info!(
            user = %self.user,
            events = report.events(),
            calendars = report.calendars(),
            failed = failed.len(),
            "Sync finished"
        );
        self.notifier
            .emit(
                NotificationKind::SyncCompleted,
                "Sync Complete",
                format!(
                    "Synced {} events from {} calendars",
                    report.events(),
                    report.calendars()
                ),
                None,
            )
            .await;

        Ok(SyncOutcome::Completed(report))
    }

    async fn fetch_source(&self, provider: &dyn CalendarProvider, window: &SyncWindow) -> SourceFetch {
        let source = provider.source();

        let credential = match self.credentials.get_credential(source) {
            Ok(c) => c,
            Err(e) => return SourceFetch::failed(source, e),
        };

        let raw_calendars = match provider.fetch_calendars(&credential).await {
            Ok(c) => c,
            Err(e) => return SourceFetch::failed(source, e),
        };

        let calendars: Vec<UnifiedCalendar> = raw_calendars
            .iter()
            .map(|raw| self.normalizer.calendar(raw, source))
            .collect();

        let results = join_all(
            calendars
                .iter()
                .map(|calendar| provider.fetch_events(&credential, &calendar.id, window)),
        )
        .await;

        let mut fetch = SourceFetch {
            report: SourceReport {
                source,
                calendars: calendars.len(),
                events: 0,
                rejected: 0,
                filtered: 0,
                error: None,
            },
            calendars: Vec::new(),
            events: Vec::new(),
            complete: true,
        };

        for (calendar, result) in calendars.into_iter().zip(results) {
            match result {
                Ok(raw_events) => {
                    let batch = self.normalizer.normalize_all(&raw_events, &calendar);
                    debug!(
                        source = %source,
                        calendar = %calendar.name,
                        events = batch.events.len(),
                        "Fetched calendar"
                    );
                    fetch.report.rejected += batch.rejected.len();
                    fetch.report.filtered += batch.filtered;
                    fetch.report.events += batch.events.len();
                    fetch.events.extend(batch.events);
                }
                Err(e) => {
                    warn!(source = %source, calendar = %calendar.name, error = %e, "Calendar fetch failed");
                    fetch.complete = false;
                    fetch.report.error.get_or_insert(e);
                }
            }
            fetch.calendars.push(calendar);
        }

        fetch
    }
}
