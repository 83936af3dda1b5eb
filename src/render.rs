//! Colored terminal rendering for engine types.

use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use eventhub_core::notifier::{Notification, NotificationKind};
use eventhub_core::orchestrator::{SyncReport, SyncState};
use eventhub_core::queue::{MutationKind, SyncQueueItem};
use eventhub_core::{Source, StoredEvent, SyncStatus};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Source {
    fn render(&self) -> String {
        match self {
            Source::Google => "google".blue().to_string(),
            Source::Microsoft => "microsoft".cyan().to_string(),
        }
    }
}

impl Render for SyncStatus {
    fn render(&self) -> String {
        match self {
            SyncStatus::Synced => "synced".green().to_string(),
            SyncStatus::Pending => "pending".yellow().to_string(),
            SyncStatus::Error => "error".red().to_string(),
        }
    }
}

impl Render for SyncState {
    fn render(&self) -> String {
        match self {
            SyncState::Idle => "idle".dimmed().to_string(),
            SyncState::Syncing => "syncing".yellow().to_string(),
            SyncState::IdleWithError(reason) => reason.red().to_string(),
        }
    }
}

impl Render for MutationKind {
    fn render(&self) -> String {
        match self {
            MutationKind::Add => "+".green().to_string(),
            MutationKind::Update => "~".yellow().to_string(),
            MutationKind::Delete => "-".red().to_string(),
        }
    }
}

impl Render for Notification {
    fn render(&self) -> String {
        let marker = if self.read { " ".to_string() } else { "●".blue().to_string() };
        let title = match self.kind {
            NotificationKind::SyncFailed => self.title.red().to_string(),
            NotificationKind::EventDeleted => self.title.yellow().to_string(),
            _ => self.title.bold().to_string(),
        };
        let when = self.created_at.with_timezone(&Local).format("%b %-d %H:%M");
        format!(
            "{} {} {}  {}",
            marker,
            title,
            self.message,
            format!("{} {}", when, self.id).dimmed()
        )
    }
}

impl Render for SyncQueueItem {
    fn render(&self) -> String {
        let attempts = format!("{} attempt{}", self.retry_count, plural(self.retry_count as usize));
        let mut line = format!("{} {} {}", self.kind.render(), self.event_key, attempts.dimmed());
        if self.terminal {
            line.push_str(&format!(" {}", "failed".red()));
        }
        if let Some(error) = &self.last_error {
            line.push_str(&format!("\n     {}", error.dimmed()));
        }
        line
    }
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        for source in &self.sources {
            match &source.error {
                Some(e) => lines.push(format!("{} {}", source.source.render(), e.to_string().red())),
                None => {
                    let mut line = format!(
                        "{} {} {} from {} {}",
                        source.source.render(),
                        source.events,
                        pluralize("event", source.events),
                        source.calendars,
                        pluralize("calendar", source.calendars),
                    );
                    if source.rejected > 0 {
                        line.push_str(&format!(" ({} skipped: invalid dates)", source.rejected).dimmed().to_string());
                    }
                    lines.push(line);
                }
            }
        }

        let r = &self.reconcile;
        let mut changes = Vec::new();
        if r.created > 0 {
            changes.push(format!("{} new", r.created).green().to_string());
        }
        if r.updated > 0 {
            changes.push(format!("{} changed", r.updated).yellow().to_string());
        }
        if r.stale > 0 {
            changes.push(format!("{} missing upstream", r.stale).dimmed().to_string());
        }
        if r.purged > 0 {
            changes.push(format!("{} removed", r.purged).red().to_string());
        }
        if changes.is_empty() {
            lines.push("Everything up to date".dimmed().to_string());
        } else {
            lines.push(changes.join(", "));
        }

        lines.join("\n")
    }
}

/// One line of an agenda: time, title and where the event comes from.
pub fn render_event(event: &StoredEvent, tz: Tz) -> String {
    let e = &event.event;
    let time = if e.is_all_day {
        format!("{:>7}", "all-day")
    } else {
        format!("{:>7}", e.start.with_timezone(&tz).format("%H:%M"))
    };
    let title = if event.deleted_locally {
        e.title.strikethrough().to_string()
    } else {
        e.title.clone()
    };
    let tag = format!("[{}] {}", e.calendar_name, event.key());

    let mut line = format!("  {} {} {}", time, title, tag.dimmed());
    if event.sync_status != SyncStatus::Synced {
        line.push_str(&format!(" {}", event.sync_status.render()));
    }
    line
}

/// Day heading: "Today", "Tomorrow" or e.g. "Wed Feb 25".
pub fn date_label(start: DateTime<Utc>, tz: Tz, today: NaiveDate) -> String {
    let date = start.with_timezone(&tz).date_naive();
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

pub fn pluralize(word: &str, count: usize) -> String {
    format!("{}{}", word, plural(count))
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
