//! Periodic sync timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::notifier::Notifier;
use crate::orchestrator::{SyncOrchestrator, SyncOutcome};

/// Run a sync pass right away and then every `interval` until `shutdown`
/// turns true. Expired notifications are purged on each tick. A pass that
/// is running when shutdown arrives is awaited, never aborted.
pub fn spawn_scheduler(
    orchestrator: Arc<SyncOrchestrator>,
    notifier: Notifier,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?interval, "Sync scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match orchestrator.refresh().await {
                Ok(SyncOutcome::Completed(report)) => {
                    debug!(events = report.events(), "Scheduled sync finished");
                }
                Ok(SyncOutcome::Coalesced) => debug!("Scheduled sync coalesced"),
                Ok(SyncOutcome::Discarded) => break,
                Err(e) => error!(error = %e, "Scheduled sync failed"),
            }

            if let Err(e) = notifier.purge_expired(Utc::now()).await {
                debug!(error = %e, "Could not purge expired notifications");
            }
        }

        info!("Sync scheduler stopped");
    })
}
