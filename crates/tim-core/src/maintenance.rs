//! Housekeeping rules applied before scheduling.
//!
//! Each rule clears `scheduled` on events whose placement has gone stale so
//! the scheduler can place them again. Every rule is idempotent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::schedule::{Block, Schedule};

/// Number of placements cleared by each rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub overdue: usize,
    pub postponed: usize,
    pub future_completed: usize,
    pub conflicting: usize,
}

impl MaintenanceReport {
    pub fn total(&self) -> usize {
        self.overdue + self.postponed + self.future_completed + self.conflicting
    }
}

/// The rule set run by each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maintenance {
    /// Also clear placements that collide with busy blocks.
    pub clear_conflicting: bool,
}

impl Maintenance {
    pub fn new(clear_conflicting: bool) -> Self {
        Self { clear_conflicting }
    }

    pub fn run(
        &self,
        schedule: &Schedule,
        events: &mut [Event],
        blocks: &[Block],
        now: DateTime<Utc>,
    ) -> MaintenanceReport {
        let report = MaintenanceReport {
            overdue: clear_overdue_events(schedule, events, now),
            postponed: unschedule_postponed_events(events),
            future_completed: clear_future_completed_events(events, now),
            conflicting: if self.clear_conflicting {
                clear_conflicting_events(events, blocks)
            } else {
                0
            },
        };
        if report.total() > 0 {
            tracing::info!(
                overdue = report.overdue,
                postponed = report.postponed,
                future_completed = report.future_completed,
                conflicting = report.conflicting,
                "cleared stale placements"
            );
        }
        report
    }
}

/// Clear incomplete events whose slot, plus the grace period, has passed.
pub fn clear_overdue_events(
    schedule: &Schedule,
    events: &mut [Event],
    now: DateTime<Utc>,
) -> usize {
    let grace = schedule.reschedule_after();
    clear_where(events, |event| {
        let Some(start) = event.scheduled else {
            return false;
        };
        let end = start + event.duration().unwrap_or_else(Duration::zero);
        !event.completed && start <= now && now > end + grace
    })
}

/// Clear incomplete events placed before their inception.
pub fn unschedule_postponed_events(events: &mut [Event]) -> usize {
    clear_where(events, |event| {
        match (event.scheduled, event.inception) {
            (Some(scheduled), Some(inception)) => !event.completed && scheduled < inception,
            _ => false,
        }
    })
}

/// Clear completed events still holding a future slot.
pub fn clear_future_completed_events(events: &mut [Event], now: DateTime<Utc>) -> usize {
    clear_where(events, |event| {
        event.completed && event.scheduled.is_some_and(|scheduled| scheduled > now)
    })
}

/// Clear incomplete events whose slot overlaps any block.
pub fn clear_conflicting_events(events: &mut [Event], blocks: &[Block]) -> usize {
    clear_where(events, |event| {
        let (Some(start), Some(end)) = (event.scheduled, event.expected_end()) else {
            return false;
        };
        !event.completed && blocks.iter().any(|block| block.overlaps(start, end))
    })
}

fn clear_where(events: &mut [Event], stale: impl Fn(&Event) -> bool) -> usize {
    let mut cleared = 0;
    for event in events.iter_mut().filter(|e| stale(e)) {
        tracing::debug!(event = %event, "clearing placement");
        event.scheduled = None;
        cleared += 1;
    }
    cleared
}
