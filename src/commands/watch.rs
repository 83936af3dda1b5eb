use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::info;

use crate::render::{Render, pluralize};
use crate::session::Session;

/// Run the periodic sync and print what changes until Ctrl-C.
pub async fn run(session: &Session) -> Result<()> {
    let hub = &session.hub;
    let mut events = hub.events();
    let mut state = hub.sync_state();
    let mut unread = hub.unread_count();
    let mut notifications = hub.notifications();

    hub.spawn_scheduler();
    info!(
        interval = %humantime::format_duration(session.settings.engine.sync_interval),
        "Watching calendars, press Ctrl-C to stop"
    );

    let mut last_seen = latest_notification(&notifications.borrow());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = events.changed() => {
                if changed.is_err() { break; }
                let count = events.borrow_and_update().len();
                println!("{} {}", count, pluralize("event", count).dimmed());
            }
            changed = state.changed() => {
                if changed.is_err() { break; }
                let rendered = state.borrow_and_update().render();
                println!("{} {}", "sync".bold(), rendered);
            }
            changed = notifications.changed() => {
                if changed.is_err() { break; }
                let list = notifications.borrow_and_update().clone();
                for n in list.iter().filter(|n| Some(n.created_at) > last_seen) {
                    println!("{}", n.render());
                }
                last_seen = latest_notification(&list).or(last_seen);
            }
            changed = unread.changed() => {
                if changed.is_err() { break; }
                let count = *unread.borrow_and_update();
                if count > 0 {
                    println!("{}", format!("{} unread", count).blue());
                }
            }
        }
    }

    Ok(())
}

fn latest_notification(list: &[eventhub_core::notifier::Notification]) -> Option<chrono::DateTime<chrono::Utc>> {
    list.iter().map(|n| n.created_at).max()
}
