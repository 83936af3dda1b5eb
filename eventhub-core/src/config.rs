//! Engine and application configuration.
//!
//! Settings live at ~/.config/eventhub/config.toml and can be overridden with
//! `EVENTHUB__*` environment variables (`EVENTHUB__ENGINE__SYNC_INTERVAL=1m`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::date_range::SyncWindow;
use crate::error::{EventHubError, EventHubResult};
use crate::event::Source;

static DEFAULT_STORE_PATH: &str = "~/.local/share/eventhub/store.json";

/// Durations written as human strings ("5m", "24h", "2s").
mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Tunables of the sync engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(with = "human_duration")]
    pub sync_interval: Duration,
    pub window_past_days: i64,
    pub window_future_days: i64,
    /// IANA zone for all-day events and offset-less times
    pub timezone: String,
    #[serde(with = "human_duration")]
    pub notification_ttl: Duration,
    pub max_retries: u32,
    #[serde(with = "human_duration")]
    pub retry_base_delay: Duration,
    #[serde(with = "human_duration")]
    pub retry_max_delay: Duration,
    #[serde(with = "human_duration")]
    pub reconnect_debounce: Duration,
    /// Complete passes an upstream-removed event survives; 0 keeps it forever
    pub stale_purge_after: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            window_past_days: DEFAULT_WINDOW_PAST_DAYS,
            window_future_days: DEFAULT_WINDOW_FUTURE_DAYS,
            timezone: "UTC".to_string(),
            notification_ttl: Duration::from_secs(DEFAULT_NOTIFICATION_TTL_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_secs(DEFAULT_RETRY_BASE_DELAY_SECS),
            retry_max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS),
            reconnect_debounce: Duration::from_millis(DEFAULT_RECONNECT_DEBOUNCE_MILLIS),
            stale_purge_after: DEFAULT_STALE_PURGE_AFTER,
        }
    }
}

impl EngineConfig {
    pub fn tz(&self) -> EventHubResult<Tz> {
        self.timezone
            .parse()
            .map_err(|_| EventHubError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    pub fn window(&self, now: DateTime<Utc>) -> SyncWindow {
        SyncWindow::around(now, self.window_past_days, self.window_future_days)
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .checked_mul(factor)
            .map_or(self.retry_max_delay, |d| d.min(self.retry_max_delay))
    }

    pub fn validate(&self) -> EventHubResult<()> {
        self.tz()?;
        if self.sync_interval.is_zero() {
            return Err(EventHubError::Config("sync_interval must be positive".into()));
        }
        if self.window_past_days < 0 || self.window_future_days < 0 {
            return Err(EventHubError::Config("sync window days cannot be negative".into()));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(EventHubError::Config(
                "retry_base_delay exceeds retry_max_delay".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API root override, mainly for testing against a local server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the access token
    pub token_env: String,
}

fn default_true() -> bool {
    true
}

impl ProviderSettings {
    fn for_source(source: Source) -> Self {
        ProviderSettings {
            enabled: true,
            base_url: None,
            token_env: format!("{}_ACCESS_TOKEN", source.as_str().to_ascii_uppercase()),
        }
    }
}

fn default_google() -> ProviderSettings {
    ProviderSettings::for_source(Source::Google)
}

fn default_microsoft() -> ProviderSettings {
    ProviderSettings::for_source(Source::Microsoft)
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Application settings at ~/.config/eventhub/config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_google")]
    pub google: ProviderSettings,
    #[serde(default = "default_microsoft")]
    pub microsoft: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            user_id: default_user_id(),
            store_path: default_store_path(),
            engine: EngineConfig::default(),
            google: default_google(),
            microsoft: default_microsoft(),
        }
    }
}

impl Settings {
    pub fn config_path() -> EventHubResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EventHubError::Config("Could not determine config directory".into()))?
            .join("eventhub");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented default file on first run.
    pub fn load() -> EventHubResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path, true)
    }

    /// Load `path`, optionally layering `EVENTHUB__*` environment variables on top.
    pub fn load_from(path: &Path, with_env: bool) -> EventHubResult<Self> {
        let mut builder =
            Config::builder().add_source(File::from(path.to_path_buf()).required(false));
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("EVENTHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: Settings = builder
            .build()
            .map_err(|e| EventHubError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| EventHubError::Config(e.to_string()))?;

        settings.engine.validate()?;
        Ok(settings)
    }

    /// Store location with `~` expanded.
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store_path.to_string_lossy()).into_owned())
    }

    pub fn provider(&self, source: Source) -> &ProviderSettings {
        match source {
            Source::Google => &self.google,
            Source::Microsoft => &self.microsoft,
        }
    }

    /// Serialize the current settings as TOML.
    pub fn to_toml(&self) -> EventHubResult<String> {
        toml::to_string_pretty(self).map_err(|e| EventHubError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> EventHubResult<()> {
        let contents = format!(
            "\
# eventhub configuration

# Whose event set the CLI works on:
# user_id = \"default\"

# Where events, notifications and the offline queue are stored:
# store_path = \"{DEFAULT_STORE_PATH}\"

# [engine]
# sync_interval = \"5m\"
# window_past_days = {DEFAULT_WINDOW_PAST_DAYS}
# window_future_days = {DEFAULT_WINDOW_FUTURE_DAYS}
# timezone = \"Europe/Berlin\"
# notification_ttl = \"24h\"
# max_retries = {DEFAULT_MAX_RETRIES}
# stale_purge_after = {DEFAULT_STALE_PURGE_AFTER}

# [google]
# token_env = \"GOOGLE_ACCESS_TOKEN\"

# [microsoft]
# enabled = false
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EventHubError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| EventHubError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.notification_ttl, Duration::from_secs(86_400));
        assert_eq!(config.tz().unwrap(), Tz::UTC);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn retry_delay_doubles_until_capped() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(30));
        assert_eq!(config.retry_delay(2), Duration::from_secs(60));
        assert_eq!(config.retry_delay(3), Duration::from_secs(120));
        assert_eq!(config.retry_delay(20), Duration::from_secs(1800));
        assert_eq!(config.retry_delay(100), Duration::from_secs(1800));
    }

    #[test]
    fn default_file_loads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eventhub").join("config.toml");
        Settings::create_default_config(&path).unwrap();

        let settings = Settings::load_from(&path, false).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.google.token_env, "GOOGLE_ACCESS_TOKEN");
        assert_eq!(settings.microsoft.token_env, "MICROSOFT_ACCESS_TOKEN");
    }

    #[test]
    fn human_durations_and_partial_sections_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "user_id = \"alice\"\n\n[engine]\nsync_interval = \"1m 30s\"\ntimezone = \"Europe/Berlin\"\n\n[microsoft]\nenabled = false\ntoken_env = \"GRAPH_TOKEN\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path, false).unwrap();
        assert_eq!(settings.user_id, "alice");
        assert_eq!(settings.engine.sync_interval, Duration::from_secs(90));
        assert_eq!(settings.engine.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!settings.microsoft.enabled);
        assert!(settings.google.enabled);
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ntimezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(
            Settings::load_from(&path, false),
            Err(EventHubError::Config(_))
        ));
    }

    #[test]
    fn settings_roundtrip_through_toml() {
        let toml = Settings::default().to_toml().unwrap();
        assert!(toml.contains("sync_interval = \"5m\""));
    }
}
