use anyhow::{Context, Result};
use eventhub_core::{EventKey, EventPatch, SyncStatus};
use owo_colors::OwoColorize;

use super::time::parse_when;
use crate::session::Session;

pub async fn run(
    session: &Session,
    key: &str,
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    location: Option<String>,
) -> Result<()> {
    let key: EventKey = key.parse().with_context(|| format!("Invalid event key '{}'", key))?;
    let tz = session.timezone;

    let start = start.as_deref().map(parse_when).transpose()?;
    let end = end.as_deref().map(parse_when).transpose()?;
    let patch = EventPatch {
        title,
        start: start.map(|w| w.start(tz)),
        end: end.map(|w| w.end(tz)),
        is_all_day: start.map(|w| w.is_day()),
        location,
        ..Default::default()
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to change. Pass --title, --start, --end or --location");
    }

    let stored = session.hub.update_event(&key, patch).await?;
    let line = format!("Updated: {}", stored.event.title);
    if stored.sync_status == SyncStatus::Synced {
        println!("{}", line.green());
    } else {
        println!("{} {}", line.yellow(), "(not yet confirmed)".dimmed());
    }
    Ok(())
}
