//! Persistence for schedules, events and configuration.
//!
//! The cycle runner talks to storage only through [`EventStore`], so the
//! SQLite store used by the CLI and the in-memory store used by tests are
//! interchangeable.

mod config;
pub mod event_db;
mod memory;
pub mod migrations;

pub use config::{Config, CycleConfig, FeedConfig};
pub use event_db::EventDb;
pub use memory::MemoryStore;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{ConfigError, StoreError};
use crate::event::Event;
use crate::schedule::Schedule;

/// Repository for schedules and their events.
///
/// Implementations are shared between concurrent cycles and must be safe to
/// call from the blocking thread pool.
pub trait EventStore: Send + Sync {
    /// Every stored schedule, ordered by id.
    fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    fn load_schedule(&self, id: i64) -> Result<Option<Schedule>, StoreError>;

    /// Insert (when `schedule.id` is 0) or update a schedule, returning its id.
    fn save_schedule(&self, schedule: &Schedule) -> Result<i64, StoreError>;

    /// Full event list of one schedule, completed events included.
    fn load_events(&self, schedule_id: i64) -> Result<Vec<Event>, StoreError>;

    /// Upsert `events` by uuid in a single transaction.
    ///
    /// Fails with [`StoreError::DuplicateSource`] without writing anything
    /// when two events of the schedule would share a `source_id`.
    fn save_events(&self, schedule_id: i64, events: &[Event]) -> Result<(), StoreError>;
}

/// Returns `~/.config/tim[-dev]/` based on TIM_ENV.
///
/// Set TIM_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TIM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tim-dev")
    } else {
        base_dir.join("tim")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Reject a batch in which two events share a `source_id`.
pub fn ensure_unique_sources<'a>(
    schedule_id: i64,
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for event in events {
        if !seen.insert(event.source_id.as_str()) {
            return Err(StoreError::DuplicateSource {
                schedule_id,
                source_id: event.source_id.clone(),
            });
        }
    }
    Ok(())
}
