use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::session::Session;

pub async fn run(session: &Session) -> Result<()> {
    let items = session.hub.pending_mutations().await?;

    if items.is_empty() {
        println!("{}", "Queue is empty".dimmed());
        return Ok(());
    }

    for item in &items {
        println!("  {}", item.render());
    }

    let failed = items.iter().filter(|i| i.terminal).count();
    if failed > 0 {
        println!(
            "\n{}",
            format!("{} change(s) out of attempts, retry with `eventhub replay --retry-failed`", failed).red()
        );
    }
    Ok(())
}
