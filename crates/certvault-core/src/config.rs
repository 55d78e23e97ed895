//! Configuration resolution for `CertVault`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/certvault/settings.json`)
//! 3. Explicit config file (`--config <path>`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::DEFAULT_NOTICE_DAYS;

const APP_DIR: &str = "certvault";

/// Complete `CertVault` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            sync: SyncSettings::default(),
            notifications: NotificationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where local state lives. `None` means the platform default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    /// Local encryption key file. Kept beside the database.
    pub key_path: Option<PathBuf>,
    /// Persisted remote session (access/refresh tokens).
    pub session_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(|| data_dir().map(|d| d.join("vault.db")))
    }

    pub fn key_path(&self) -> Option<PathBuf> {
        self.key_path
            .clone()
            .or_else(|| data_dir().map(|d| d.join("vault.key")))
    }

    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_path
            .clone()
            .or_else(|| data_dir().map(|d| d.join("session.json")))
    }
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`.
    pub url: Option<String>,
    /// Public anon key sent as `apikey`.
    pub anon_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            request_timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Both URL and key present and non-empty.
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.anon_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Periodic sync and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub interval_secs: u64,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    pub backoff_multiplier: f64,
    /// Fraction of each delay randomised in either direction (0.0 - 1.0).
    pub jitter_ratio: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            backoff_initial_secs: 5,
            backoff_max_secs: 300,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

/// Expiry notice settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Days before expiry at which a certificate is `upcoming`.
    pub expiry_notice_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            expiry_notice_days: DEFAULT_NOTICE_DAYS,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(config_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load explicit config
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        let explicit = load_config_file(path)?;
        merge_config(&mut config, explicit);
    }

    // Apply environment overrides
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Per-user application directory for the global settings file.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR).join("settings.json"))
}

/// Per-user data directory holding the database, key and session files.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(APP_DIR))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    // Merge storage paths
    if overlay.storage.database_path.is_some() {
        base.storage.database_path = overlay.storage.database_path;
    }
    if overlay.storage.key_path.is_some() {
        base.storage.key_path = overlay.storage.key_path;
    }
    if overlay.storage.session_path.is_some() {
        base.storage.session_path = overlay.storage.session_path;
    }

    // Merge remote config
    if overlay.remote.url.is_some() {
        base.remote.url = overlay.remote.url;
    }
    if overlay.remote.anon_key.is_some() {
        base.remote.anon_key = overlay.remote.anon_key;
    }
    base.remote.request_timeout_secs = overlay.remote.request_timeout_secs;

    base.sync = overlay.sync;
    base.notifications = overlay.notifications;
    base.log_level = overlay.log_level;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("CERTVAULT_SUPABASE_URL") {
        config.remote.url = Some(val);
    }
    if let Some(val) = var("CERTVAULT_SUPABASE_ANON_KEY") {
        config.remote.anon_key = Some(val);
    }
    if let Some(val) = var("CERTVAULT_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("CERTVAULT_KEY_PATH") {
        config.storage.key_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("CERTVAULT_SYNC_INTERVAL_SECS") {
        if let Ok(n) = val.parse() {
            config.sync.interval_secs = n;
        }
    }
    if let Some(val) = var("CERTVAULT_NOTICE_DAYS") {
        if let Ok(n) = val.parse() {
            config.notifications.expiry_notice_days = n;
        }
    }
    if let Some(val) = var("CERTVAULT_LOG_LEVEL") {
        config.log_level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_syncs_every_30s() {
        let config = Config::default();
        assert_eq!(config.sync.interval_secs, 30);
        assert_eq!(config.notifications.expiry_notice_days, 30);
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn remote_needs_both_url_and_key() {
        let mut remote = RemoteConfig {
            url: Some("https://example.supabase.co".into()),
            ..Default::default()
        };
        assert!(!remote.is_configured());
        remote.anon_key = Some(String::new());
        assert!(!remote.is_configured());
        remote.anon_key = Some("anon".into());
        assert!(remote.is_configured());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("CERTVAULT_SUPABASE_URL", "https://env.supabase.co"),
            ("CERTVAULT_SYNC_INTERVAL_SECS", "90"),
            ("CERTVAULT_NOTICE_DAYS", "not-a-number"),
            ("CERTVAULT_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.remote.url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(config.sync.interval_secs, 90);
        // Unparseable values leave the default untouched
        assert_eq!(config.notifications.expiry_notice_days, 30);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn explicit_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"remote": {"url": "https://file.supabase.co", "anon_key": "k", "request_timeout_secs": 5},
                "storage": {"database_path": "/tmp/certvault-test.db"}}"#,
        )
        .unwrap();

        let mut config = Config::default();
        merge_config(&mut config, load_config_file(&path).unwrap());

        assert!(config.remote.is_configured());
        assert_eq!(config.remote.request_timeout_secs, 5);
        assert_eq!(
            config.storage.database_path(),
            Some(PathBuf::from("/tmp/certvault-test.db"))
        );
        // Sections absent from the file keep their defaults
        assert_eq!(config.sync.interval_secs, 30);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/certvault.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn corrupted_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }
}
