//! Core engine for eventhub.
//!
//! This crate aggregates events from several calendar providers into one
//! per-user event set:
//! - `event` holds the provider-neutral model shared by adapters and the engine
//! - `normalize` turns provider payloads into `UnifiedEvent`s
//! - `reconcile` merges a fresh snapshot into the persisted set
//! - `orchestrator` and `scheduler` drive sync passes
//! - `projector`, `queue` and `notifier` serve consumers of the session
//! - `session` wires all of the above for one signed-in user

pub mod config;
pub mod connectivity;
pub mod constants;
pub mod credentials;
pub mod date_range;
pub mod error;
pub mod event;
pub mod normalize;
pub mod notifier;
pub mod orchestrator;
pub mod projector;
pub mod provider;
pub mod queue;
pub mod reconcile;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod store;

pub use error::{EventHubError, EventHubResult};
pub use event::*;
pub use session::{EventHub, SessionContext};
