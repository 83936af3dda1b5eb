//! Provider-neutral event types.
//!
//! These types represent calendar events in a provider-agnostic way.
//! Adapters convert their API responses into these types, and the engine
//! works exclusively with them for reconciliation, storage and projection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{GOOGLE_DEFAULT_COLOR, LOCAL_ID_PREFIX, MICROSOFT_DEFAULT_COLOR};
use crate::error::EventHubError;

/// The external calendar provider an event or calendar came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Google,
    Microsoft,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Google, Source::Microsoft];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Google => "google",
            Source::Microsoft => "microsoft",
        }
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            Source::Google => GOOGLE_DEFAULT_COLOR,
            Source::Microsoft => MICROSOFT_DEFAULT_COLOR,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = EventHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Source::Google),
            "microsoft" | "outlook" => Ok(Source::Microsoft),
            other => Err(EventHubError::Validation(format!("Unknown source '{other}'"))),
        }
    }
}

/// The owner of a session's event set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event attendee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Response status as reported by the provider ("accepted", "declined", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A calendar event (provider-neutral)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedEvent {
    /// Provider-scoped id; unique together with `source`
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    /// Never before `start`; end-of-day for all-day events
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Organizer>,
    pub calendar_id: String,
    pub calendar_name: String,
    pub calendar_color: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    /// Last modification time reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl UnifiedEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.source, &self.id)
    }

    pub fn is_local_only(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

impl fmt::Display for UnifiedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedCalendar {
    pub id: String,
    pub name: String,
    pub color: String,
    pub source: Source,
    #[serde(default)]
    pub is_primary: bool,
}

/// Globally unique identity of an event within a user's set: `source:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub source: Source,
    pub id: String,
}

impl EventKey {
    pub fn new(source: Source, id: impl Into<String>) -> Self {
        EventKey {
            source,
            id: id.into(),
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

impl FromStr for EventKey {
    type Err = EventHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, id) = s
            .split_once(':')
            .ok_or_else(|| EventHubError::Validation(format!("Malformed event key '{s}'")))?;
        if id.is_empty() {
            return Err(EventHubError::Validation(format!("Malformed event key '{s}'")));
        }
        Ok(EventKey::new(source.parse()?, id))
    }
}

/// Confidence in the freshness of a stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    /// Tie-break rank on equal versions: synced beats pending beats error.
    pub fn rank(&self) -> u8 {
        match self {
            SyncStatus::Synced => 2,
            SyncStatus::Pending => 1,
            SyncStatus::Error => 0,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// The persisted form of an event, owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: UnifiedEvent,
    pub user_id: String,
    pub sync_status: SyncStatus,
    pub version: u64,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while an optimistic local mutation awaits confirmation
    #[serde(default)]
    pub local_edit_at: Option<DateTime<Utc>>,
    /// Tombstone for an optimistic delete not yet confirmed upstream
    #[serde(default)]
    pub deleted_locally: bool,
    /// Consecutive complete sync passes that did not see this event
    #[serde(default)]
    pub pending_cycles: u32,
}

impl StoredEvent {
    pub fn key(&self) -> EventKey {
        self.event.key()
    }

    /// Ordering used to resolve competing copies of the same key:
    /// the highest version wins, equal versions prefer synced, then pending, then error.
    pub fn precedence(&self) -> (u64, u8) {
        (self.version, self.sync_status.rank())
    }

    pub fn wins_over(&self, other: &StoredEvent) -> bool {
        self.precedence() > other.precedence()
    }

    pub fn has_local_edit(&self) -> bool {
        self.local_edit_at.is_some()
    }

    /// True when a local edit happened after the provider last modified `upstream`.
    pub fn local_edit_is_newer_than(&self, upstream: &UnifiedEvent) -> bool {
        match (self.local_edit_at, upstream.source_updated_at) {
            (Some(local), Some(remote)) => local > remote,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.sync_status == SyncStatus::Synced && !self.deleted_locally
    }
}

/// Fields for a locally created event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Organizer>,
    pub calendar_id: Option<String>,
    pub source: Option<Source>,
}

/// A partial update to an existing event. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }

    pub fn apply(&self, event: &mut UnifiedEvent) {
        if let Some(ref title) = self.title {
            event.title = title.clone();
        }
        if let Some(start) = self.start {
            event.start = start;
        }
        if let Some(end) = self.end {
            event.end = end;
        }
        if let Some(all_day) = self.is_all_day {
            event.is_all_day = all_day;
        }
        if let Some(ref location) = self.location {
            event.location = Some(location.clone());
        }
        if let Some(ref description) = self.description {
            event.description = Some(description.clone());
        }
    }
}
