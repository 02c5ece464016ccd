pub mod config;
pub mod cycle;
pub mod events;
pub mod schedule;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tim_core::{Config, EventDb};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Paths given on the command line, resolved lazily by each command.
pub struct Context {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Self {
        Self { config_path, db_path }
    }

    pub fn config_path(&self) -> Result<PathBuf, tim_core::ConfigError> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Config::path(),
        }
    }

    pub fn load_config(&self) -> Result<Config, tim_core::ConfigError> {
        Config::load_from(&self.config_path()?)
    }

    /// Opens `--db`, then `database` from the config, then the default file.
    pub fn open_store(&self, config: &Config) -> tim_core::Result<Arc<EventDb>> {
        let db = match self.db_path.as_ref().or(config.database.as_ref()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "opening event store");
                EventDb::open(path)?
            }
            None => EventDb::open_default()?,
        };
        Ok(Arc::new(db))
    }
}

/// Parses an RFC 3339 instant, defaulting to the current time.
pub fn parse_now(at: Option<&str>) -> Result<DateTime<Utc>, chrono::ParseError> {
    match at {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
