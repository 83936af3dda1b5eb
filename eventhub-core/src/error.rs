//! Error types for the eventhub engine.

use thiserror::Error;

use crate::event::Source;

/// Errors that can occur in eventhub operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventHubError {
    #[error("Access to {0} expired, sign in again")]
    AuthExpired(Source),

    #[error("Insufficient permissions for {0}: {1}")]
    PermissionDenied(Source, String),

    #[error("Rate limited by {0}, try again later")]
    RateLimited(Source),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid data: {0}")]
    Validation(String),

    #[error("Store commit failed: {0}")]
    StoreCommit(String),

    #[error("Document changed concurrently: {0}")]
    Conflict(String),

    #[error("No credential available for {0}")]
    Unauthenticated(Source),

    #[error("{0} returned server error {1}")]
    ServerError(Source, u16),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("{0} is not supported")]
    Unsupported(String),
}

impl EventHubError {
    /// Map an unsuccessful HTTP status from a provider API to the error taxonomy.
    pub fn from_status(source: Source, status: u16, context: &str) -> Self {
        match status {
            401 => EventHubError::AuthExpired(source),
            403 => EventHubError::PermissionDenied(source, context.to_string()),
            404 | 410 => EventHubError::NotFound(context.to_string()),
            429 => EventHubError::RateLimited(source),
            400 | 422 => EventHubError::Validation(format!("{context} ({status})")),
            500..=599 => EventHubError::ServerError(source, status),
            _ => EventHubError::Provider(format!("{source}: {context} ({status})")),
        }
    }

    /// Errors worth retrying without user intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            EventHubError::NetworkUnavailable(_)
            | EventHubError::RateLimited(_)
            | EventHubError::ServerError(..) => true,
            _ => false,
        }
    }

    /// Credential problems the UI should answer with a re-auth prompt.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            EventHubError::AuthExpired(_) | EventHubError::Unauthenticated(_)
        )
    }
}

impl From<std::io::Error> for EventHubError {
    fn from(e: std::io::Error) -> Self {
        EventHubError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EventHubError {
    fn from(e: serde_json::Error) -> Self {
        EventHubError::Serialization(e.to_string())
    }
}

/// Result type alias for eventhub operations.
pub type EventHubResult<T> = Result<T, EventHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(
            EventHubError::from_status(Source::Google, 401, "calendars"),
            EventHubError::AuthExpired(Source::Google)
        );
        assert!(matches!(
            EventHubError::from_status(Source::Microsoft, 403, "calendars"),
            EventHubError::PermissionDenied(Source::Microsoft, _)
        ));
        assert_eq!(
            EventHubError::from_status(Source::Microsoft, 429, "events"),
            EventHubError::RateLimited(Source::Microsoft)
        );
        assert!(matches!(
            EventHubError::from_status(Source::Google, 404, "calendar x"),
            EventHubError::NotFound(_)
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(EventHubError::from_status(Source::Google, 503, "events").is_transient());
        assert!(EventHubError::NetworkUnavailable("offline".into()).is_transient());
        assert!(!EventHubError::AuthExpired(Source::Google).is_transient());
        assert!(!EventHubError::Validation("bad date".into()).is_transient());
    }
}
