//! Configuration management

use crate::core::{Error, Result};
use crate::rollup::RetentionPolicy;
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
    #[serde(default)]
    pub meter: MeterConfig,
    /// Per-series retention overrides, keyed by series name
    #[serde(default)]
    pub retention: BTreeMap<String, usize>,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join("power-meter");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else {
            let config = Self::default();
            config.save()?;
            config
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `POWER_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("POWER_METER_DB") {
            self.storage.path = path;
        }

        if let Some(start) = lookup("POWER_SET_TIME") {
            self.updater.start_time = start;
        }

        if let Some(policy) = lookup("POWER_FAILURE_POLICY") {
            match policy.as_str() {
                "degrade" => self.updater.failure_policy = FailurePolicy::Degrade,
                "fail_fast" => self.updater.failure_policy = FailurePolicy::FailFast,
                other => log::warn!("Ignoring unknown POWER_FAILURE_POLICY: {}", other),
            }
        }
    }

    /// Check every setting that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.retention_policy()?;
        self.updater.start_clock()?;

        if self.meter.idle_watts < 0.0 || self.meter.max_load_watts < 0.0 {
            return Err(Error::Config(
                "Meter wattage estimates must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Retention limits with this configuration's overrides applied
    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::with_overrides(&self.retention)
    }
}

/// Series storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file path; empty uses the data directory
    #[serde(default)]
    pub path: String,
}

impl StorageConfig {
    pub fn db_path(&self) -> Option<PathBuf> {
        if self.path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.path))
        }
    }
}

/// What the updater does when a tier's rollup fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and keep going
    #[default]
    Degrade,
    /// Stop the updater and exit
    FailFast,
}

/// Rollup updater settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Virtual clock start: RFC 3339 or epoch milliseconds; empty means now
    #[serde(default)]
    pub start_time: String,
}

impl UpdaterConfig {
    /// Parsed `start_time`, if one is set
    pub fn start_clock(&self) -> Result<Option<DateTime<Local>>> {
        let raw = self.start_time.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        if let Ok(millis) = raw.parse::<i64>() {
            return Local
                .timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| Error::Config(format!("Start time out of range: {}", raw)));
        }

        DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Local)))
            .map_err(|e| Error::Config(format!("Invalid start time {:?}: {}", raw, e)))
    }
}

/// Per-second sampler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Run the sampler in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Estimated draw at idle, in watts
    #[serde(default = "default_idle_watts")]
    pub idle_watts: f64,
    /// Additional draw at full CPU load, in watts
    #[serde(default = "default_max_load_watts")]
    pub max_load_watts: f64,
}

fn default_true() -> bool { true }
fn default_idle_watts() -> f64 { 30.0 }
fn default_max_load_watts() -> f64 { 120.0 }

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_watts: default_idle_watts(),
            max_load_watts: default_max_load_watts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::Tier;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert!(config.storage.db_path().is_none());
        assert_eq!(config.updater.failure_policy, FailurePolicy::Degrade);
        assert!(config.meter.enabled);
        assert_eq!(config.meter.idle_watts, 30.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(
            r#"
            [storage]
            path = "/var/lib/power-meter/series.db"

            [updater]
            failure_policy = "fail_fast"
            start_time = "2016-02-01T00:00:00Z"

            [meter]
            enabled = false

            [retention]
            minutes = 2000
            "#,
        )
        .unwrap();

        assert_eq!(
            config.storage.db_path(),
            Some(PathBuf::from("/var/lib/power-meter/series.db"))
        );
        assert_eq!(config.updater.failure_policy, FailurePolicy::FailFast);
        assert!(!config.meter.enabled);
        assert_eq!(config.retention_policy().unwrap().limit(Tier::Minutes), 2000);

        let start = config.updater.start_clock().unwrap().unwrap();
        assert_eq!(start.timestamp_millis(), 1_454_284_800_000);
    }

    #[test]
    fn test_unknown_tier_fails_validation() {
        let config = Config::from_toml("[retention]\nfortnights = 10\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::UnknownTier(_))));
    }

    #[test]
    fn test_misspelled_policy_is_rejected() {
        let result = Config::from_toml(
            "[storage]\npath = \"/data/series.db\"\n[updater]\nfailure_policy = \"fail-fast\"\n",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_start_time_fails_validation() {
        let mut config = Config::default();
        config.updater.start_time = "yesterday".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_start_time_from_epoch_millis() {
        let updater = UpdaterConfig {
            start_time: "1454284800000".to_string(),
            ..Default::default()
        };
        let start = updater.start_clock().unwrap().unwrap();
        assert_eq!(start.timestamp_millis(), 1_454_284_800_000);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("POWER_METER_DB", "/tmp/series.db"),
            ("POWER_SET_TIME", "1454284800000"),
            ("POWER_FAILURE_POLICY", "fail_fast"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.path, "/tmp/series.db");
        assert_eq!(config.updater.start_time, "1454284800000");
        assert_eq!(config.updater.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.retention.insert("days".to_string(), 400);

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.retention.get("days"), Some(&400));
    }
}
