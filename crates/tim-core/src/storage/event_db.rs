//! SQLite-based storage for schedules and events.

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{data_dir, ensure_unique_sources, migrations, EventStore};
use crate::error::StoreError;
use crate::event::{Event, Flag};
use crate::schedule::{ReschedulingBehavior, Schedule};

const TIME_FORMAT: &str = "%H:%M:%S";

const EVENT_COLUMNS: &str = "uuid, schedule_id, content, inception, deadline, duration, scheduled,
     completed, completed_at, flags, contexts, progression, progression_order,
     source, source_id, source_url, recurrence_id, source_metadata, updated_at";

const SCHEDULE_COLUMNS: &str = "id, user, rescheduling_behavior, timezone, start_day_at,
     end_day_at, active_days, reschedule_after, shift_after_early_completion";

// === Helper Functions ===

fn corrupt(table: &str, message: impl Display) -> StoreError {
    StoreError::Corrupt {
        table: table.to_string(),
        message: message.to_string(),
    }
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|at| at.to_rfc3339())
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| corrupt("events", format!("bad timestamp '{raw}': {e}")))
        })
        .transpose()
}

fn parse_time(raw: &str) -> Result<NaiveTime, StoreError> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| corrupt("schedules", format!("bad time '{raw}': {e}")))
}

/// Raw `events` row, decoded outside the rusqlite row callback so decode
/// failures surface as [`StoreError::Corrupt`].
struct EventRow {
    uuid: String,
    schedule_id: i64,
    content: String,
    inception: Option<String>,
    deadline: Option<String>,
    duration: Option<i64>,
    scheduled: Option<String>,
    completed: bool,
    completed_at: Option<String>,
    flags: String,
    contexts: String,
    progression: Option<String>,
    progression_order: i64,
    source: String,
    source_id: String,
    source_url: String,
    recurrence_id: String,
    source_metadata: String,
    updated_at: Option<String>,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            uuid: row.get(0)?,
            schedule_id: row.get(1)?,
            content: row.get(2)?,
            inception: row.get(3)?,
            deadline: row.get(4)?,
            duration: row.get(5)?,
            scheduled: row.get(6)?,
            completed: row.get(7)?,
            completed_at: row.get(8)?,
            flags: row.get(9)?,
            contexts: row.get(10)?,
            progression: row.get(11)?,
            progression_order: row.get(12)?,
            source: row.get(13)?,
            source_id: row.get(14)?,
            source_url: row.get(15)?,
            recurrence_id: row.get(16)?,
            source_metadata: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    fn into_event(self) -> Result<Event, StoreError> {
        let uuid = Uuid::parse_str(&self.uuid)
            .map_err(|e| corrupt("events", format!("bad uuid '{}': {e}", self.uuid)))?;
        let flags: BTreeSet<Flag> = serde_json::from_str(&self.flags)
            .map_err(|e| corrupt("events", format!("bad flags for {uuid}: {e}")))?;
        let contexts: BTreeSet<String> = serde_json::from_str(&self.contexts)
            .map_err(|e| corrupt("events", format!("bad contexts for {uuid}: {e}")))?;
        let source_metadata = serde_json::from_str(&self.source_metadata)
            .map_err(|e| corrupt("events", format!("bad metadata for {uuid}: {e}")))?;

        Ok(Event {
            uuid,
            schedule_id: self.schedule_id,
            content: self.content,
            inception: parse_timestamp(self.inception)?,
            deadline: parse_timestamp(self.deadline)?,
            duration: self.duration,
            scheduled: parse_timestamp(self.scheduled)?,
            completed: self.completed,
            completed_at: parse_timestamp(self.completed_at)?,
            flags,
            contexts,
            progression: self.progression,
            progression_order: self.progression_order,
            source: self.source,
            source_id: self.source_id,
            source_url: self.source_url,
            recurrence_id: self.recurrence_id,
            source_metadata,
            updated_at: parse_timestamp(self.updated_at)?,
        })
    }
}

struct ScheduleRow {
    id: i64,
    user: String,
    rescheduling_behavior: String,
    timezone: String,
    start_day_at: String,
    end_day_at: String,
    active_days: String,
    reschedule_after: i64,
    shift_after_early_completion: bool,
}

impl ScheduleRow {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user: row.get(1)?,
            rescheduling_behavior: row.get(2)?,
            timezone: row.get(3)?,
            start_day_at: row.get(4)?,
            end_day_at: row.get(5)?,
            active_days: row.get(6)?,
            reschedule_after: row.get(7)?,
            shift_after_early_completion: row.get(8)?,
        })
    }

    fn into_schedule(self) -> Result<Schedule, StoreError> {
        Ok(Schedule {
            id: self.id,
            user: self.user,
            rescheduling_behavior: self
                .rescheduling_behavior
                .parse::<ReschedulingBehavior>()
                .map_err(|e| corrupt("schedules", e))?,
            timezone: Schedule::parse_timezone(&self.timezone)
                .map_err(|e| corrupt("schedules", e))?,
            start_day_at: parse_time(&self.start_day_at)?,
            end_day_at: parse_time(&self.end_day_at)?,
            active_days: Schedule::parse_days(&self.active_days)
                .map_err(|e| corrupt("schedules", e))?,
            reschedule_after: self.reschedule_after,
            shift_after_early_completion: self.shift_after_early_completion,
        })
    }
}

/// SQLite database for schedule and event storage.
///
/// The connection sits behind a mutex so one store can serve concurrent
/// cycles; every call holds the lock for its full duration.
pub struct EventDb {
    conn: Mutex<Connection>,
}

impl EventDb {
    /// Open (or create) the database at `~/.config/tim/tim.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open_default() -> crate::Result<Self> {
        let path = data_dir()?.join("tim.db");
        Ok(Self::open(path)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        // Create base tables (v1 schema) first
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schedules (
                id                           INTEGER PRIMARY KEY AUTOINCREMENT,
                user                         TEXT NOT NULL,
                rescheduling_behavior        TEXT NOT NULL DEFAULT 'EFFICIENCY',
                timezone                     TEXT NOT NULL DEFAULT 'UTC',
                start_day_at                 TEXT NOT NULL DEFAULT '07:00:00',
                end_day_at                   TEXT NOT NULL DEFAULT '22:00:00',
                active_days                  TEXT NOT NULL DEFAULT 'Mon Tue Wed Thu Fri Sat Sun',
                reschedule_after             INTEGER NOT NULL DEFAULT 30,
                shift_after_early_completion INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS events (
                uuid              TEXT PRIMARY KEY,
                schedule_id       INTEGER NOT NULL REFERENCES schedules(id),
                content           TEXT NOT NULL,
                inception         TEXT,
                deadline          TEXT,
                duration          INTEGER,
                scheduled         TEXT,
                completed         INTEGER NOT NULL DEFAULT 0,
                completed_at      TEXT,
                flags             TEXT NOT NULL DEFAULT '[]',
                contexts          TEXT NOT NULL DEFAULT '[]',
                progression       TEXT,
                progression_order INTEGER NOT NULL DEFAULT 0,
                source            TEXT NOT NULL,
                source_id         TEXT NOT NULL,
                source_url        TEXT NOT NULL DEFAULT '',
                recurrence_id     TEXT NOT NULL DEFAULT '',
                source_metadata   TEXT NOT NULL DEFAULT 'null'
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_source_unique
                ON events(schedule_id, source_id);",
        )?;

        // Run incremental migrations (v1 -> v2, etc.)
        migrations::migrate(conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Locked)
    }
}

impl EventStore for EventDb {
    fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], ScheduleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ScheduleRow::into_schedule).collect()
    }

    fn load_schedule(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                params![id],
                ScheduleRow::from_row,
            )
            .optional()?;
        row.map(ScheduleRow::into_schedule).transpose()
    }

    fn save_schedule(&self, schedule: &Schedule) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let start = schedule.start_day_at.format(TIME_FORMAT).to_string();
        let end = schedule.end_day_at.format(TIME_FORMAT).to_string();
        let days = Schedule::format_days(&schedule.active_days);

        if schedule.id == 0 {
            conn.execute(
                "INSERT INTO schedules (user, rescheduling_behavior, timezone, start_day_at,
                     end_day_at, active_days, reschedule_after, shift_after_early_completion)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    schedule.user,
                    schedule.rescheduling_behavior.as_str(),
                    schedule.timezone.name(),
                    start,
                    end,
                    days,
                    schedule.reschedule_after,
                    schedule.shift_after_early_completion,
                ],
            )?;
            let id = conn.last_insert_rowid();
            tracing::debug!(schedule_id = id, user = %schedule.user, "created schedule");
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO schedules (id, user, rescheduling_behavior, timezone, start_day_at,
                 end_day_at, active_days, reschedule_after, shift_after_early_completion)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 user = excluded.user,
                 rescheduling_behavior = excluded.rescheduling_behavior,
                 timezone = excluded.timezone,
                 start_day_at = excluded.start_day_at,
                 end_day_at = excluded.end_day_at,
                 active_days = excluded.active_days,
                 reschedule_after = excluded.reschedule_after,
                 shift_after_early_completion = excluded.shift_after_early_completion",
            params![
                schedule.id,
                schedule.user,
                schedule.rescheduling_behavior.as_str(),
                schedule.timezone.name(),
                start,
                end,
                days,
                schedule.reschedule_after,
                schedule.shift_after_early_completion,
            ],
        )?;
        Ok(schedule.id)
    }

    fn load_events(&self, schedule_id: i64) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE schedule_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map(params![schedule_id], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    fn save_events(&self, schedule_id: i64, events: &[Event]) -> Result<(), StoreError> {
        ensure_unique_sources(schedule_id, events)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO events ({EVENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 ON CONFLICT(uuid) DO UPDATE SET
                     schedule_id = excluded.schedule_id,
                     content = excluded.content,
                     inception = excluded.inception,
                     deadline = excluded.deadline,
                     duration = excluded.duration,
                     scheduled = excluded.scheduled,
                     completed = excluded.completed,
                     completed_at = excluded.completed_at,
                     flags = excluded.flags,
                     contexts = excluded.contexts,
                     progression = excluded.progression,
                     progression_order = excluded.progression_order,
                     source = excluded.source,
                     source_id = excluded.source_id,
                     source_url = excluded.source_url,
                     recurrence_id = excluded.recurrence_id,
                     source_metadata = excluded.source_metadata,
                     updated_at = excluded.updated_at"
            ))?;

            for event in events {
                let flags = serde_json::to_string(&event.flags)
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                let contexts = serde_json::to_string(&event.contexts)
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                let metadata = serde_json::to_string(&event.source_metadata)
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

                stmt.execute(params![
                    event.uuid.to_string(),
                    schedule_id,
                    event.content,
                    format_timestamp(event.inception),
                    format_timestamp(event.deadline),
                    event.duration,
                    format_timestamp(event.scheduled),
                    event.completed,
                    format_timestamp(event.completed_at),
                    flags,
                    contexts,
                    event.progression,
                    event.progression_order,
                    event.source,
                    event.source_id,
                    event.source_url,
                    event.recurrence_id,
                    metadata,
                    format_timestamp(event.updated_at),
                ])
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(failure, _)
                        if failure.code == ErrorCode::ConstraintViolation
                            && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                    {
                        StoreError::DuplicateSource {
                            schedule_id,
                            source_id: event.source_id.clone(),
                        }
                    }
                    other => other.into(),
                })?;
            }
        }
        tx.commit()?;
        tracing::debug!(schedule_id, count = events.len(), "saved events");
        Ok(())
    }
}
