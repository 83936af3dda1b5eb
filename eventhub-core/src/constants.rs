//! Defaults shared across the engine.

/// Days of history fetched on every sync pass.
pub const DEFAULT_WINDOW_PAST_DAYS: i64 = 30;

/// Days ahead fetched on every sync pass.
pub const DEFAULT_WINDOW_FUTURE_DAYS: i64 = 90;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5 * 60;

pub const DEFAULT_NOTIFICATION_TTL_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

pub const DEFAULT_RETRY_BASE_DELAY_SECS: u64 = 30;

pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 30 * 60;

pub const DEFAULT_RECONNECT_DEBOUNCE_MILLIS: u64 = 2_000;

/// Complete passes an upstream-removed event may stay pending before it is purged.
pub const DEFAULT_STALE_PURGE_AFTER: u32 = 3;

pub const GOOGLE_DEFAULT_COLOR: &str = "#4285f4";

pub const MICROSOFT_DEFAULT_COLOR: &str = "#0078d4";

/// Google's built-in calendar of contact birthdays.
pub const GOOGLE_BIRTHDAY_CALENDAR_ID: &str = "addressbook#contacts@group.v.calendar.google.com";

pub const UNTITLED_EVENT: &str = "No Title";

/// Prefix for ids of events created locally and not yet confirmed by a provider.
pub const LOCAL_ID_PREFIX: &str = "local_";
