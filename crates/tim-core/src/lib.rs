//! # tim Core Library
//!
//! This library provides the scheduling engine behind the `tim` CLI: it
//! pulls tasks from external sources, merges them into one persisted event
//! set and assigns each pending event a start time inside the user's daily
//! working window.
//!
//! ## Architecture
//!
//! - **Reconciliation**: merges integration data into stored events by
//!   source id, retiring superseded recurrences
//! - **Availability**: subtracts busy blocks from the working window
//! - **Scheduler**: priority ordering plus a minute-granular greedy search
//!   scored by suitability
//! - **Maintenance**: clears stale placements before each run
//! - **Cycle**: per-schedule single-flight orchestration of all of the above
//! - **Storage**: SQLite event store and TOML configuration
//!
//! ## Key Components
//!
//! - [`CycleRunner`]: Entry point running one cycle per schedule
//! - [`AutoScheduler`]: Greedy placement of events into free time
//! - [`Reconciler`]: Merging of incoming events
//! - [`EventStore`]: Repository trait for schedules and events
//! - [`Integrator`]: Trait for external task and calendar sources

pub mod availability;
pub mod cycle;
pub mod error;
pub mod event;
pub mod integrations;
pub mod maintenance;
pub mod reconciliation;
pub mod schedule;
pub mod scheduler;
pub mod storage;

pub use availability::{find_availability, Interval};
pub use cycle::{CycleReport, CycleRunner, CycleSettings, IntegrationFailure};
pub use error::{ConfigError, CoreError, Result, StoreError, ValidationError};
pub use event::{DayPart, Event, Flag};
pub use integrations::{FeedProvider, Integrator, IntegratorProvider, JsonFeedIntegrator};
pub use maintenance::{Maintenance, MaintenanceReport};
pub use reconciliation::{ReconcileSummary, Reconciler};
pub use schedule::{Block, ReschedulingBehavior, Schedule};
pub use scheduler::{AutoScheduler, ScheduleOutcome, SchedulerConfig};
pub use storage::{Config, EventDb, EventStore, MemoryStore};
