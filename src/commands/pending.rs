use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::render_event;
use crate::session::Session;

pub async fn run(session: &Session) -> Result<()> {
    let events = session.offline_events().await;

    if events.is_empty() {
        println!("{}", "No unconfirmed changes".dimmed());
        return Ok(());
    }

    for event in &events {
        println!("{}", render_event(event, session.timezone));
    }
    Ok(())
}
