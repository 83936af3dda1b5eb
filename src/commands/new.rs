use anyhow::Result;
use eventhub_core::{EventDraft, Source, SyncStatus};
use owo_colors::OwoColorize;

use super::time::{When, parse_duration, parse_when};
use crate::session::Session;

pub struct NewArgs {
    pub title: String,
    pub start: String,
    pub end: Option<String>,
    pub duration: Option<String>,
    pub location: Option<String>,
    pub calendar: Option<String>,
    pub source: Option<Source>,
}

pub async fn run(session: &Session, args: NewArgs) -> Result<()> {
    let tz = session.timezone;
    let start = parse_when(&args.start)?;
    let end = resolve_end(&start, args.end.as_deref(), args.duration.as_deref())?;

    let draft = EventDraft {
        title: Some(args.title),
        start: Some(start.start(tz)),
        end: Some(end.end(tz)),
        is_all_day: start.is_day(),
        location: args.location.filter(|l| !l.is_empty()),
        calendar_id: args.calendar,
        source: args.source,
        ..Default::default()
    };

    let stored = session.hub.add_event(draft).await?;
    let line = format!("Created: {} ({})", stored.event.title, stored.key());
    match stored.sync_status {
        SyncStatus::Synced => println!("{}", line.green()),
        _ => {
            println!("{}", line.yellow());
            println!("{}", "Saved locally, it will be pushed on the next replay".dimmed());
        }
    }
    Ok(())
}

fn resolve_end(start: &When, end: Option<&str>, duration: Option<&str>) -> Result<When> {
    let end = match (end, duration) {
        (Some(end), _) => parse_when(end)?,
        (None, Some(duration)) => {
            let end = start.plus(parse_duration(duration)?);
            // A duration of whole days covers that many days, the start included
            match end {
                When::Day(d) if end != *start => When::Day(d - chrono::Duration::days(1)),
                other => other,
            }
        }
        (None, None) => start.default_end(),
    };

    if end.is_day() != start.is_day() {
        anyhow::bail!("Start and end must both be dates or both be times");
    }
    Ok(end)
}
