//! Access credentials handed to provider adapters.
//!
//! The engine never acquires, refreshes or stores tokens. A `CredentialProvider`
//! supplied by the host application is asked for one on every provider call.

use std::collections::HashMap;
use std::fmt;

use crate::error::{EventHubError, EventHubResult};
use crate::event::Source;

#[derive(Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential {
            access_token: token.into(),
        }
    }
}

// Tokens must never reach logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    /// A currently valid credential for `source`, or `Unauthenticated`.
    fn get_credential(&self, source: Source) -> EventHubResult<Credential>;

    /// Whether the user linked an account for `source` at all. Sync passes
    /// still report an unlinked source, as failed with `Unauthenticated`.
    fn is_linked(&self, source: Source) -> bool {
        self.get_credential(source).is_ok()
    }
}

/// Fixed credentials, for tools and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    tokens: HashMap<Source, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Source, credential: Credential) -> Self {
        self.tokens.insert(source, credential);
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_credential(&self, source: Source) -> EventHubResult<Credential> {
        self.tokens
            .get(&source)
            .cloned()
            .ok_or(EventHubError::Unauthenticated(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", Credential::bearer("ya29.secret"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn missing_source_is_unauthenticated() {
        let creds = StaticCredentials::new().with(Source::Google, Credential::bearer("t"));
        assert!(creds.is_linked(Source::Google));
        assert!(!creds.is_linked(Source::Microsoft));
        assert_eq!(
            creds.get_credential(Source::Microsoft),
            Err(EventHubError::Unauthenticated(Source::Microsoft))
        );
    }
}
