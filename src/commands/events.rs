use anyhow::Result;
use chrono::Utc;
use eventhub_core::date_range::{DateRange, DateRangePreset, start_of_day};
use eventhub_core::search::SearchFilters;
use eventhub_core::Source;
use owo_colors::OwoColorize;

use crate::render::{date_label, pluralize, render_event};
use crate::session::Session;

pub struct EventsArgs {
    pub query: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub range: Option<String>,
    pub calendars: Vec<String>,
    pub sources: Vec<Source>,
    pub all_day: Option<bool>,
}

pub async fn run(session: &Session, args: EventsArgs) -> Result<()> {
    let tz = session.timezone;
    let today = Utc::now().with_timezone(&tz).date_naive();

    let range = match args.range {
        Some(preset) => preset
            .parse::<DateRangePreset>()
            .map_err(|e| anyhow::anyhow!(e))?
            .resolve(today, tz),
        // Upcoming events unless a bound was given
        None if args.from.is_none() && args.to.is_none() => DateRange {
            from: Some(start_of_day(today, tz)),
            to: None,
        },
        None => DateRange::from_args(args.from.as_deref(), args.to.as_deref(), tz)
            .map_err(|e| anyhow::anyhow!(e))?,
    };
    let filters = SearchFilters {
        query: args.query.unwrap_or_default(),
        range,
        calendars: args.calendars,
        sources: args.sources,
        all_day: args.all_day,
    };

    // Wait for the first snapshot so the search runs over the stored set
    session.events().await;
    let (events, stats) = session.hub.search(&filters);

    if events.is_empty() {
        if stats.total == 0 {
            println!("{}", "No events yet, run `eventhub sync` first".dimmed());
        } else {
            println!("{}", "No events found".dimmed());
        }
        return Ok(());
    }

    let mut current_date: Option<String> = None;
    for event in &events {
        let label = date_label(event.event.start, tz, today);
        if current_date.as_ref() != Some(&label) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", label.bold());
            current_date = Some(label);
        }
        println!("{}", render_event(event, tz));
    }

    if filters.is_active() {
        let per_source = stats
            .by_source
            .iter()
            .map(|(source, n)| format!("{} {}", n, source))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "\n{}",
            format!(
                "{} of {} {} ({})",
                stats.filtered,
                stats.total,
                pluralize("event", stats.total),
                per_source
            )
            .dimmed()
        );
    }

    Ok(())
}
