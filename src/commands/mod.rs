pub mod config;
pub mod delete;
pub mod edit;
pub mod events;
pub mod new;
pub mod notifications;
pub mod pending;
pub mod queue;
pub mod replay;
pub mod sync;
pub mod watch;

mod time;
