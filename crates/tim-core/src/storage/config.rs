//! TOML-based application configuration.
//!
//! Stores:
//! - Cycle tuning (integration timeout, publish window, conflict clearing)
//! - JSON feed integrations, one entry per feed
//! - An optional database path override
//!
//! Configuration is stored at `~/.config/tim/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Cycle runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Upper bound for each integrator call, in seconds.
    #[serde(default = "default_integration_timeout")]
    pub integration_timeout_secs: u64,
    /// Events changed within this many days of now are published.
    #[serde(default = "default_publish_window")]
    pub publish_window_days: i64,
    /// Clear placements that overlap busy blocks before scheduling.
    #[serde(default)]
    pub clear_conflicting: bool,
}

/// A local JSON feed bound to one schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub schedule_id: i64,
    pub name: String,
    /// Feed document to read.
    pub path: PathBuf,
    /// Where published events are written, if anywhere.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Margin added around each busy block.
    #[serde(default)]
    pub buffer_minutes: i64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tim/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Database file; defaults to `tim.db` in the data directory.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

// Default functions
fn default_integration_timeout() -> u64 {
    30
}
fn default_publish_window() -> i64 {
    7
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            integration_timeout_secs: default_integration_timeout(),
            publish_window_days: default_publish_window(),
            clear_conflicting: false,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    invalid(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(schedule_id: i64, name: &str) -> FeedConfig {
        FeedConfig {
            schedule_id,
            name: name.to_string(),
            path: PathBuf::from(format!("/tmp/{name}.json")),
            output: None,
            buffer_minutes: 0,
        }
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.cycle.integration_timeout_secs, 30);
        assert_eq!(cfg.cycle.publish_window_days, 7);
        assert!(!cfg.cycle.clear_conflicting);
        assert!(cfg.feeds.is_empty());
        assert!(cfg.database.is_none());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[cycle]
clear_conflicting = true

[[feeds]]
schedule_id = 1
name = "work"
path = "work.json"
"#,
        )
        .unwrap();
        assert!(parsed.cycle.clear_conflicting);
        assert_eq!(parsed.cycle.integration_timeout_secs, 30);
        assert_eq!(parsed.feeds.len(), 1);
        assert_eq!(parsed.feeds[0].buffer_minutes, 0);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("cycle.integration_timeout_secs").as_deref(), Some("30"));
        assert_eq!(cfg.get("cycle.clear_conflicting").as_deref(), Some("false"));
        assert!(cfg.get("cycle.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("cycle.clear_conflicting", "true").unwrap();
        cfg.set("cycle.publish_window_days", "14").unwrap();
        cfg.set("database", "/var/lib/tim.db").unwrap();
        assert!(cfg.cycle.clear_conflicting);
        assert_eq!(cfg.cycle.publish_window_days, 14);
        assert_eq!(cfg.database, Some(PathBuf::from("/var/lib/tim.db")));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        let result = cfg.set("cycle.nonexistent_key", "value");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        let result = cfg.set("cycle.clear_conflicting", "sometimes");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        let result = cfg.set("cycle.integration_timeout_secs", "-5");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn feeds_can_be_replaced_as_json() {
        let mut cfg = Config::default();
        cfg.set(
            "feeds",
            r#"[{"schedule_id": 2, "name": "home", "path": "home.json", "buffer_minutes": 5}]"#,
        )
        .unwrap();
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].buffer_minutes, 5);
    }

    #[test]
    fn load_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.feeds.push(feed(1, "work"));
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cycle = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
