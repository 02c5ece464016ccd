use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::event::Event;
use crate::schedule::Block;

/// Error type returned by integrators. Failures are isolated per call by the
/// cycle runner, so any error type will do.
pub type IntegrationError = Box<dyn std::error::Error + Send + Sync>;

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Every external task or calendar source implements this trait.
///
/// Calls are blocking; the cycle runner moves each one onto the blocking
/// pool under a timeout. Integrators must hand back typed events, with raw
/// labels already validated into flags.
pub trait Integrator: Send + Sync {
    /// Unique identifier (e.g. "todo", "calendar"), used in logs.
    fn name(&self) -> &str;

    /// Open events, including ones scheduled up to `until`.
    fn get_pending_events(&self, _until: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
        Ok(Vec::new()) // default no-op
    }

    /// Events completed since `after`.
    fn get_completed_events(&self, _after: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
        Ok(Vec::new()) // default no-op
    }

    /// Busy time between `after` and `until`.
    fn get_blocks(
        &self,
        _after: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> IntegrationResult<Vec<Block>> {
        Ok(Vec::new()) // default no-op
    }

    /// Push recently changed events back to the source.
    fn write_events(&self, _events: &[Event]) -> IntegrationResult<()> {
        Ok(()) // default no-op
    }
}

/// Yields the connected integrators of a schedule.
pub trait IntegratorProvider: Send + Sync {
    fn integrators(&self, schedule_id: i64) -> Vec<Arc<dyn Integrator>>;
}

/// Provider with no integrators at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntegrators;

impl IntegratorProvider for NoIntegrators {
    fn integrators(&self, _schedule_id: i64) -> Vec<Arc<dyn Integrator>> {
        Vec::new()
    }
}
