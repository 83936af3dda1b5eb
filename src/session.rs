//! Opens an engine session from the user's settings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use eventhub_core::config::Settings;
use eventhub_core::credentials::{Credential, CredentialProvider};
use eventhub_core::provider::CalendarProvider;
use eventhub_core::store::MemoryStore;
use eventhub_core::{EventHub, EventHubError, EventHubResult, SessionContext, Source, StoredEvent, UserId};
use eventhub_provider_google::GoogleProvider;
use eventhub_provider_outlook::OutlookProvider;
use tokio::sync::watch;
use tracing::debug;

/// How long to wait for the store to deliver its first event snapshot
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads access tokens from the environment variables named in settings.
/// Tokens are looked up on every call so a refreshed variable is picked up.
pub struct EnvCredentials {
    vars: HashMap<Source, String>,
}

impl EnvCredentials {
    pub fn from_settings(settings: &Settings) -> Self {
        let vars = Source::ALL
            .into_iter()
            .filter(|s| settings.provider(*s).enabled)
            .map(|s| (s, settings.provider(s).token_env.clone()))
            .collect();
        EnvCredentials { vars }
    }
}

impl CredentialProvider for EnvCredentials {
    fn get_credential(&self, source: Source) -> EventHubResult<Credential> {
        self.vars
            .get(&source)
            .and_then(|var| std::env::var(var).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(Credential::bearer)
            .ok_or(EventHubError::Unauthenticated(source))
    }
}

pub struct Session {
    pub hub: EventHub,
    pub settings: Settings,
    pub timezone: Tz,
}

impl Session {
    pub async fn open(offline: bool) -> Result<Self> {
        let settings = Settings::load().context("Failed to load settings")?;
        let timezone = settings.engine.tz()?;

        let store_path = settings.store_path();
        let store = MemoryStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?;

        let providers = build_providers(&settings, timezone)?;
        let credentials = EnvCredentials::from_settings(&settings);
        let linked: Vec<_> = providers
            .iter()
            .map(|p| p.source())
            .filter(|s| credentials.is_linked(*s))
            .collect();
        debug!(?linked, "Linked sources");

        let context = SessionContext {
            user_id: UserId::new(&settings.user_id),
            online: !offline,
        };
        let hub = EventHub::start(
            context,
            Arc::new(store),
            providers,
            Arc::new(credentials),
            settings.engine.clone(),
        )
        .await?;

        Ok(Session {
            hub,
            settings,
            timezone,
        })
    }

    /// The visible event list once the store has delivered it.
    pub async fn events(&self) -> Vec<StoredEvent> {
        current(self.hub.events()).await
    }

    /// Events waiting for provider confirmation.
    pub async fn offline_events(&self) -> Vec<StoredEvent> {
        current(self.hub.offline_events()).await
    }

    pub async fn close(self) {
        self.hub.shutdown().await;
    }
}

async fn current<T: Clone>(mut rx: watch::Receiver<T>) -> T {
    if tokio::time::timeout(SNAPSHOT_TIMEOUT, rx.changed()).await.is_err() {
        debug!("No store snapshot yet, using the last known list");
    }
    rx.borrow().clone()
}

fn build_providers(settings: &Settings, timezone: Tz) -> Result<Vec<Arc<dyn CalendarProvider>>> {
    let mut providers: Vec<Arc<dyn CalendarProvider>> = Vec::new();

    if settings.google.enabled {
        let google = match &settings.google.base_url {
            Some(url) => GoogleProvider::with_base_url(url)?,
            None => GoogleProvider::new()?,
        };
        providers.push(Arc::new(google.with_timezone(timezone)));
    }

    if settings.microsoft.enabled {
        let outlook = match &settings.microsoft.base_url {
            Some(url) => OutlookProvider::with_base_url(url)?,
            None => OutlookProvider::new()?,
        };
        providers.push(Arc::new(outlook.with_timezone(timezone)));
    }

    if providers.is_empty() {
        anyhow::bail!(
            "No calendar sources enabled.\n\n\
            Enable one in {}:\n  \
            [google]\n  \
            enabled = true",
            Settings::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".into())
        );
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sources_have_no_credentials() {
        let mut settings = Settings::default();
        settings.microsoft.enabled = false;
        settings.google.token_env = "EVENTHUB_TEST_TOKEN_UNSET_1".into();

        let credentials = EnvCredentials::from_settings(&settings);
        assert!(!credentials.vars.contains_key(&Source::Microsoft));
        assert_eq!(
            credentials.get_credential(Source::Google),
            Err(EventHubError::Unauthenticated(Source::Google))
        );
    }

    #[test]
    fn providers_follow_enabled_flags() {
        let mut settings = Settings::default();
        settings.google.enabled = false;
        let providers = build_providers(&settings, Tz::UTC).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].source(), Source::Microsoft);

        settings.microsoft.enabled = false;
        assert!(build_providers(&settings, Tz::UTC).is_err());
    }
}
