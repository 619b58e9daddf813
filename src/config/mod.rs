//! Configuration management module
//!
//! Provides centralized configuration including:
//! - File paths under `$HOME/.fleet-watch/` (log, settings, state, caches)
//! - Build information (date, version, authors)
//! - `Settings` loaded from `config.toml`, with environment overrides for secrets
//!
//! All paths fall back to the temporary directory when HOME is not available.

use crate::alerts::rules::SensorThresholds;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

/// Configuration manager
pub struct Config;

impl Config {
    /// Root data directory: `$FLEET_WATCH_HOME`, else `$HOME/.fleet-watch`, else a temp dir.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("FLEET_WATCH_HOME") {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".fleet-watch");
        }
        std::env::temp_dir().join("fleet-watch")
    }

    /// Get the log file path: `<data_dir>/debug.log`
    pub fn log_file_path() -> PathBuf {
        Self::data_dir().join("debug.log")
    }

    /// Settings file: `<data_dir>/config.toml`
    pub fn config_file_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Persisted session, language, recipient and sent-alert ids: `<data_dir>/state.json`
    pub fn state_file_path() -> PathBuf {
        Self::data_dir().join("state.json")
    }

    /// Translation cache: `<data_dir>/translation-cache.json`
    pub fn translation_cache_path() -> PathBuf {
        Self::data_dir().join("translation-cache.json")
    }

    /// Undeliverable alerts: `<data_dir>/dead-letters.json`
    pub fn dead_letter_file_path() -> PathBuf {
        Self::data_dir().join("dead-letters.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_directory() -> std::io::Result<()> {
        std::fs::create_dir_all(Self::data_dir())
    }

    /// Build date injected by build.rs, or "unknown".
    pub fn build_date() -> String {
        option_env!("BUILD_DATE").unwrap_or("unknown").to_string()
    }

    /// Returns the package version from CARGO_PKG_VERSION.
    pub fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Returns the package authors from CARGO_PKG_AUTHORS.
    pub fn authors() -> String {
        env!("CARGO_PKG_AUTHORS").to_string()
    }
}

/// Liveness classification settings. One threshold for every consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSettings {
    /// A vehicle whose last update is older than this is offline (strictly greater).
    pub threshold_ms: u64,
    /// How often the monitor re-evaluates liveness without a new snapshot.
    pub poll_interval_ms: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            threshold_ms: 20_000,
            poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    File,
    Firestore,
}

/// Where telemetry snapshots come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// JSON snapshot file (kind = "file"). Defaults to `<data_dir>/shipments.json`.
    pub snapshot_file: Option<PathBuf>,
    pub firestore_project: Option<String>,
    pub firestore_api_key: Option<String>,
    pub collection: String,
    pub fetch_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::File,
            snapshot_file: None,
            firestore_project: None,
            firestore_api_key: None,
            collection: "shipments".to_string(),
            fetch_interval_ms: 2_000,
            request_timeout_secs: 10,
        }
    }
}

impl SourceSettings {
    pub fn snapshot_file_path(&self) -> PathBuf {
        self.snapshot_file
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("shipments.json"))
    }
}

/// EmailJS delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    pub default_recipient: String,
    pub timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.emailjs.com/api/v1.0/email/send".to_string(),
            service_id: None,
            template_id: None,
            public_key: None,
            default_recipient: "demo@harvest.link".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Retry policy for the alert delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub queue_capacity: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    pub endpoint: String,
    pub cache_ttl_days: u64,
    pub timeout_secs: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://libretranslate.de/translate".to_string(),
            cache_ttl_days: 7,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripSettings {
    /// Base URL of the trip-history backend (`/api/v1/trips/history` is appended).
    pub api_base_url: String,
    pub limit: u32,
    /// Offset applied to start/end times in CSV reports.
    pub report_utc_offset_minutes: i32,
    pub timeout_secs: u64,
}

impl Default for TripSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            limit: 50,
            report_utc_offset_minutes: 0,
            timeout_secs: 10,
        }
    }
}

/// Settings read from `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub liveness: LivenessSettings,
    /// Vehicles to watch. Empty means every vehicle in the collection.
    pub tracked_vehicles: Vec<String>,
    pub thresholds: SensorThresholds,
    pub source: SourceSettings,
    pub email: EmailSettings,
    pub delivery: DeliverySettings,
    pub translation: TranslationSettings,
    pub trips: TripSettings,
}

impl Settings {
    /// Load settings from the config file, apply environment overrides and validate.
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Config::config_file_path();
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file {:?}", path))?;
            info!("Config: loading settings from {:?}", path);
            Self::from_toml_str(&content)?
        } else {
            debug!("Config: no settings file at {:?}, using defaults", path);
            Self::default()
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse settings file")
    }

    /// E-mail keys may come from the environment so they stay out of the settings file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("FLEET_WATCH_EMAILJS_SERVICE_ID") {
            self.email.service_id = Some(v);
        }
        if let Some(v) = non_empty("FLEET_WATCH_EMAILJS_TEMPLATE_ID") {
            self.email.template_id = Some(v);
        }
        if let Some(v) = non_empty("FLEET_WATCH_EMAILJS_PUBLIC_KEY") {
            self.email.public_key = Some(v);
        }
        if let Some(v) = non_empty("FLEET_WATCH_FIRESTORE_API_KEY") {
            self.source.firestore_api_key = Some(v);
        }
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.liveness.threshold_ms == 0 {
            anyhow::bail!("liveness.threshold_ms must be greater than zero");
        }
        if self.liveness.poll_interval_ms == 0 {
            anyhow::bail!("liveness.poll_interval_ms must be greater than zero");
        }
        if self.delivery.max_attempts == 0 {
            anyhow::bail!("delivery.max_attempts must be at least 1");
        }
        for (name, value) in [
            ("email.endpoint", &self.email.endpoint),
            ("translation.endpoint", &self.translation.endpoint),
            ("trips.api_base_url", &self.trips.api_base_url),
        ] {
            Url::parse(value).with_context(|| format!("Invalid URL for {}: {}", name, value))?;
        }
        if self.source.kind == SourceKind::Firestore && self.source.firestore_project.is_none() {
            anyhow::bail!("source.firestore_project is required when source.kind = \"firestore\"");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.liveness.threshold_ms, 20_000);
        assert_eq!(settings.email.default_recipient, "demo@harvest.link");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
tracked_vehicles = ["GJ-01-LIVE"]

[liveness]
threshold_ms = 15000
"#,
        )
        .unwrap();
        assert_eq!(settings.liveness.threshold_ms, 15_000);
        assert_eq!(settings.liveness.poll_interval_ms, 2_000);
        assert_eq!(settings.tracked_vehicles, vec!["GJ-01-LIVE".to_string()]);
        assert_eq!(settings.source.collection, "shipments");
    }

    #[test]
    fn test_env_overrides_ignore_empty_values() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|key| match key {
            "FLEET_WATCH_EMAILJS_SERVICE_ID" => Some("service_x".to_string()),
            "FLEET_WATCH_EMAILJS_PUBLIC_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(settings.email.service_id.as_deref(), Some("service_x"));
        assert!(settings.email.public_key.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.liveness.threshold_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.trips.api_base_url = "not a url".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.source.kind = SourceKind::Firestore;
        assert!(settings.validate().is_err());
    }
}
