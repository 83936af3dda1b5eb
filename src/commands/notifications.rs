use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::session::Session;

pub async fn run(session: &Session, read: Option<&str>, all: bool, delete: Option<&str>) -> Result<()> {
    let notifier = session.hub.notifier();

    if let Some(id) = delete {
        notifier.delete_notification(id).await?;
        println!("Deleted {}", id);
        return Ok(());
    }
    if let Some(id) = read {
        notifier.mark_as_read(id).await?;
        println!("Marked {} as read", id);
        return Ok(());
    }
    if all {
        let marked = notifier.mark_all_as_read().await?;
        println!("Marked {} notification(s) as read", marked);
        return Ok(());
    }

    let now = Utc::now();
    let purged = notifier.purge_expired(now).await?;
    let active = notifier.active(now).await?;

    if active.is_empty() {
        println!("{}", "No notifications".dimmed());
    }
    for notification in &active {
        println!("{}", notification.render());
    }

    let unread = eventhub_core::notifier::unread_count(&active);
    if unread > 0 {
        println!("\n{}", format!("{} unread", unread).blue());
    }
    if purged > 0 {
        tracing::debug!(purged, "Removed expired notifications");
    }
    Ok(())
}

pub async fn clear(session: &Session) -> Result<()> {
    let cleared = session.hub.notifier().clear_all_notifications().await?;
    println!("Cleared {} notification(s)", cleared);
    Ok(())
}
