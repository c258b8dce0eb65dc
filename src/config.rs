//! Service configuration
//!
//! Read from `config/hub.yaml` when the file exists, then overridden field by
//! field from the environment.

use crate::stream::DEFAULT_OUTBOX_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Default configuration file location
pub const CONFIG_FILE: &str = "config/hub.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Events a consumer may have queued before it is evicted
    pub outbox_capacity: usize,
    /// Gateway snapshot file
    pub data_file: String,
    /// Directory of the rolling JSON log
    pub log_dir: String,
    /// Log at debug level
    pub debug: bool,
    /// Seconds between consumer statistics log lines, 0 disables them
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            data_file: "data/gateway.yaml".to_string(),
            log_dir: "logs".to_string(),
            debug: false,
            stats_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load from [`CONFIG_FILE`] and the process environment
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed
    pub async fn load() -> Result<Self, ConfigError> {
        let config = Self::load_from(CONFIG_FILE).await?;
        Ok(config
            .apply_overrides(|key| std::env::var(key).ok())
            .validated())
    }

    /// Load from a YAML file, falling back to defaults when it is missing
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let config = serde_yaml::from_str(&content)?;
                info!(path = %path.display(), "Configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment overrides read through `lookup`
    ///
    /// Values that do not parse are ignored with a warning.
    #[must_use]
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("HUB_OUTBOX_CAPACITY") {
            match value.trim().parse() {
                Ok(capacity) => self.outbox_capacity = capacity,
                Err(_) => warn!(value = %value, "Ignoring invalid HUB_OUTBOX_CAPACITY"),
            }
        }
        if let Some(value) = lookup("HUB_DATA_FILE").filter(|v| !v.is_empty()) {
            self.data_file = value;
        }
        if let Some(value) = lookup("HUB_LOG_DIR").filter(|v| !v.is_empty()) {
            self.log_dir = value;
        }
        if lookup("DEBUG").is_some_and(|v| !v.is_empty()) {
            self.debug = true;
        }
        if let Some(value) = lookup("HUB_STATS_INTERVAL") {
            match value.trim().parse() {
                Ok(secs) => self.stats_interval_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid HUB_STATS_INTERVAL"),
            }
        }
        self
    }

    /// Clamp values the hub cannot run with
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.outbox_capacity == 0 {
            warn!("outbox_capacity must be at least 1, using 1");
            self.outbox_capacity = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.data_file, "data/gateway.yaml");
        assert_eq!(config.log_dir, "logs");
        assert!(!config.debug);
        assert_eq!(config.stats_interval_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().apply_overrides(env(&[
            ("HUB_OUTBOX_CAPACITY", "32"),
            ("HUB_DATA_FILE", "/var/lib/hub/data.yaml"),
            ("HUB_LOG_DIR", "/var/log/hub"),
            ("DEBUG", "1"),
            ("HUB_STATS_INTERVAL", "5"),
        ]));

        assert_eq!(config.outbox_capacity, 32);
        assert_eq!(config.data_file, "/var/lib/hub/data.yaml");
        assert_eq!(config.log_dir, "/var/log/hub");
        assert!(config.debug);
        assert_eq!(config.stats_interval_secs, 5);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let config = Config::default().apply_overrides(env(&[
            ("HUB_OUTBOX_CAPACITY", "lots"),
            ("HUB_STATS_INTERVAL", "-1"),
            ("DEBUG", ""),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config = Config::default()
            .apply_overrides(env(&[("HUB_OUTBOX_CAPACITY", "0")]))
            .validated();
        assert_eq!(config.outbox_capacity, 1);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("warden-hub-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("hub.yaml");
        tokio::fs::write(&path, "outbox_capacity: 8\ndebug: true\n")
            .await
            .unwrap();

        let config = Config::load_from(&path).await.unwrap();
        assert_eq!(config.outbox_capacity, 8);
        assert!(config.debug);
        // Missing fields keep their defaults
        assert_eq!(config.log_dir, "logs");

        let missing = Config::load_from(dir.join("missing.yaml")).await.unwrap();
        assert_eq!(missing, Config::default());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
