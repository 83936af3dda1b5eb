use anyhow::{Context, Result};
use eventhub_core::EventKey;
use owo_colors::OwoColorize;

use crate::session::Session;

pub async fn run(session: &Session, key: &str) -> Result<()> {
    let key: EventKey = key.parse().with_context(|| format!("Invalid event key '{}'", key))?;

    if session.hub.delete_event(&key).await? {
        println!("{}", format!("Deleted {}", key).red());
    } else {
        println!(
            "{} {}",
            format!("Deleted {}", key).yellow(),
            "(queued until the provider confirms)".dimmed()
        );
    }
    Ok(())
}
