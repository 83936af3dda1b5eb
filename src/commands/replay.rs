use anyhow::Result;
use owo_colors::OwoColorize;

use crate::session::Session;
use crate::utils::tui;

pub async fn run(session: &Session, retry_failed: bool) -> Result<()> {
    let hub = &session.hub;

    if retry_failed {
        let reset = hub.retry_failed_mutations().await?;
        println!("Reset {} failed change(s)", reset);
    }

    let spinner = tui::create_spinner("Pushing local changes");
    let report = hub.sync_offline_events().await;
    spinner.finish_and_clear();
    let report = report?;

    if report.attempted == 0 {
        println!("{}", "Nothing to push".dimmed());
        return Ok(());
    }

    println!("{}", format!("{} pushed", report.succeeded).green());
    if report.failed > 0 {
        println!("{}", format!("{} failed, will retry", report.failed).yellow());
    }
    if report.terminal > 0 {
        println!("{}", format!("{} out of attempts", report.terminal).red());
    }
    if report.superseded > 0 {
        println!("{}", format!("{} replaced by newer upstream copies", report.superseded).dimmed());
    }
    if report.deferred > 0 {
        println!("{}", format!("{} waiting for their retry delay", report.deferred).dimmed());
    }
    Ok(())
}
