mod commands;
mod render;
mod session;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use eventhub_core::Source;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eventhub")]
#[command(about = "Sync Google and Microsoft calendars into one event store")]
struct Cli {
    /// Start the session offline; changes are queued until `replay`
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass over every linked calendar source
    Sync,
    /// Keep syncing on the configured interval until interrupted
    Watch,
    /// List synced events
    Events {
        /// Text matched against title, description, location and people
        query: Option<String>,

        /// Show events from this date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "range")]
        from: Option<String>,

        /// Show events until this date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "range")]
        to: Option<String>,

        /// today, tomorrow, this-week, next-week, this-month or next-month
        #[arg(short, long)]
        range: Option<String>,

        /// Only events of these calendar ids
        #[arg(short, long)]
        calendar: Vec<String>,

        /// Only events of these sources (google, microsoft)
        #[arg(short, long)]
        source: Vec<Source>,

        /// Only all-day events
        #[arg(long, conflicts_with = "timed")]
        all_day: bool,

        /// Only timed events
        #[arg(long)]
        timed: bool,
    },
    /// List events with changes not yet confirmed by their provider
    Pending,
    /// List queued mutations
    Queue,
    /// Push queued mutations to their providers
    Replay {
        /// Also retry mutations that ran out of attempts
        #[arg(long)]
        retry_failed: bool,
    },
    /// Show notifications, or mark them as read
    Notifications {
        /// Mark one notification as read
        #[arg(long, conflicts_with = "all")]
        read: Option<String>,

        /// Mark every notification as read
        #[arg(long, conflicts_with = "delete")]
        all: bool,

        /// Delete one notification
        #[arg(long, conflicts_with = "read")]
        delete: Option<String>,
    },
    /// Delete every notification
    ClearNotifications,
    /// Create an event
    New {
        /// Event title
        title: String,

        /// Start date/time (e.g., "2025-03-20", "2025-03-20T15:00" or "tomorrow 3pm")
        #[arg(short, long)]
        start: String,

        /// End date/time
        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        /// Duration (e.g., "30m", "1h", "2h30m")
        #[arg(short, long)]
        duration: Option<String>,

        /// Event location
        #[arg(short, long)]
        location: Option<String>,

        /// Calendar id (defaults to the primary calendar)
        #[arg(short, long)]
        calendar: Option<String>,

        /// Source to create the event in
        #[arg(long)]
        source: Option<Source>,
    },
    /// Change an existing event
    Edit {
        /// Event key, as printed by `events` (e.g. "google:abc123")
        key: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        start: Option<String>,

        #[arg(short, long)]
        end: Option<String>,

        #[arg(short, long)]
        location: Option<String>,
    },
    /// Delete an event
    Delete {
        /// Event key, as printed by `events`
        key: String,
    },
    /// Show config and store locations
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eventhub=info,eventhub_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => commands::config::run(),
        command => {
            let session = session::Session::open(cli.offline).await?;
            let result = dispatch(&session, command).await;
            session.close().await;
            result
        }
    }
}

async fn dispatch(session: &session::Session, command: Commands) -> Result<()> {
    match command {
        Commands::Sync => commands::sync::run(session).await,
        Commands::Watch => commands::watch::run(session).await,
        Commands::Events {
            query,
            from,
            to,
            range,
            calendar,
            source,
            all_day,
            timed,
        } => {
            let all_day = match (all_day, timed) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let args = commands::events::EventsArgs {
                query,
                from,
                to,
                range,
                calendars: calendar,
                sources: source,
                all_day,
            };
            commands::events::run(session, args).await
        }
        Commands::Pending => commands::pending::run(session).await,
        Commands::Queue => commands::queue::run(session).await,
        Commands::Replay { retry_failed } => commands::replay::run(session, retry_failed).await,
        Commands::Notifications { read, all, delete } => {
            commands::notifications::run(session, read.as_deref(), all, delete.as_deref()).await
        }
        Commands::ClearNotifications => commands::notifications::clear(session).await,
        Commands::New {
            title,
            start,
            end,
            duration,
            location,
            calendar,
            source,
        } => {
            let args = commands::new::NewArgs {
                title,
                start,
                end,
                duration,
                location,
                calendar,
                source,
            };
            commands::new::run(session, args).await
        }
        Commands::Edit {
            key,
            title,
            start,
            end,
            location,
        } => commands::edit::run(session, &key, title, start, end, location).await,
        Commands::Delete { key } => commands::delete::run(session, &key).await,
        Commands::Config => commands::config::run(),
    }
}
