use anyhow::Result;
use eventhub_core::orchestrator::SyncOutcome;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::session::Session;
use crate::utils::tui;

pub async fn run(session: &Session) -> Result<()> {
    let spinner = tui::create_spinner("Syncing calendars");
    let outcome = session.hub.refresh_events().await;
    spinner.finish_and_clear();

    match outcome? {
        SyncOutcome::Completed(report) => {
            println!("{}", report.render());
            let failed = report.failed_sources().count();
            if failed > 0 && failed == report.sources.len() {
                anyhow::bail!("All calendar sources failed");
            }
        }
        SyncOutcome::Coalesced => println!("{}", "A sync is already running".dimmed()),
        SyncOutcome::Discarded => println!("{}", "Sync cancelled".dimmed()),
    }

    let pending = session.hub.pending_mutations().await?;
    let waiting = pending.iter().filter(|i| !i.terminal).count();
    if waiting > 0 {
        println!(
            "{}",
            format!("{} local change(s) waiting, run `eventhub replay` to push them", waiting).yellow()
        );
    }

    Ok(())
}
