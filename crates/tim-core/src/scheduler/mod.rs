//! Greedy event scheduler.
//!
//! Assigns start times to pending events inside one scheduling window:
//! - Freezes work that is currently in progress and blocks its time
//! - Orders the remaining candidates once by priority
//! - Places each candidate at the viable minute with the best suitability,
//!   recomputing free time after every placement
//!
//! The search is a linear minute-by-minute scan. It is exact for the greedy
//! order but not globally optimal.

pub mod priority;
pub mod suitability;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::availability::{find_availability, free_minutes, Interval};
use crate::event::{Event, Flag};
use crate::schedule::{Block, Schedule};

pub use priority::priority;
pub use suitability::suitability;

/// Result of one scheduling run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    /// Placed events in placement order.
    pub scheduled: Vec<Event>,
    /// Candidates with no viable minute; their `scheduled` is cleared.
    pub unschedulable: Vec<Event>,
}

impl ScheduleOutcome {
    /// Scheduled events followed by unschedulable ones.
    pub fn into_events(self) -> Vec<Event> {
        let mut events = self.scheduled;
        events.extend(self.unschedulable);
        events
    }

    pub fn len(&self) -> usize {
        self.scheduled.len() + self.unschedulable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Distance between candidate minutes (minutes)
    pub step_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { step_minutes: 1 }
    }
}

/// Greedy scheduler for one schedule's events
pub struct AutoScheduler {
    config: SchedulerConfig,
}

impl AutoScheduler {
    /// Create a new scheduler with default config
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Build a schedule for `[window_start, window_end)`.
    ///
    /// # Arguments
    /// * `schedule` - Owning schedule (timezone, grace period, behavior)
    /// * `events` - The schedule's full event list; it is not modified
    /// * `blocks` - Busy time supplied by integrations
    /// * `window` - Scheduling window, usually from [`Schedule::current_window`]
    /// * `now` - Current time, used to detect work in progress
    ///
    /// # Returns
    /// Copies of every candidate event with updated `scheduled` values.
    /// Callers persist them to commit the schedule.
    pub fn build_schedule(
        &self,
        schedule: &Schedule,
        events: &[Event],
        blocks: &[Block],
        window: (DateTime<Utc>, DateTime<Utc>),
        now: DateTime<Utc>,
    ) -> ScheduleOutcome {
        let (window_start, window_end) = window;
        let mut blocks = blocks.to_vec();

        // 1. Freeze work in progress
        let grace = schedule.reschedule_after();
        let mut frozen = HashSet::new();
        for event in events.iter().filter(|e| !e.completed) {
            let (Some(start), Some(end)) = (event.scheduled, event.expected_end()) else {
                continue;
            };
            if start <= window_start && event.is_ongoing(now, grace) {
                tracing::debug!(event = %event, "not rescheduling, currently ongoing");
                frozen.insert(event.uuid);
                blocks.push(Block::new(start, end));
            }
        }

        // Time freed by an early finish stays reserved unless shifting is on
        if !schedule.shift_after_early_completion {
            for event in events.iter().filter(|e| e.completed) {
                let (Some(start), Some(end)) = (event.scheduled, event.expected_end()) else {
                    continue;
                };
                if start <= now && now < end {
                    blocks.push(Block::new(now, end));
                }
            }
        }

        // 2. Candidates
        let candidates: Vec<&Event> = events
            .iter()
            .filter(|e| !e.completed && !frozen.contains(&e.uuid))
            .filter(|e| e.inception.map_or(true, |inception| inception < window_end))
            .filter(|e| e.scheduled.map_or(true, |at| at >= window_start))
            .collect();

        // 3. Order once by priority, stable on ties
        let mut ranked: Vec<(f64, Event)> = candidates
            .into_iter()
            .map(|e| (priority(schedule, window_end, e), e.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        // 4. Place one at a time
        let mut outcome = ScheduleOutcome::default();
        for (_, mut event) in ranked {
            let availability = find_availability(window_start, window_end, &blocks);
            tracing::trace!(free_minutes = free_minutes(&availability), "availability");
            match self.best_time(schedule, &availability, &outcome.scheduled, &event) {
                Some(best) => {
                    tracing::debug!(event = %event, at = %best, "scheduled event");
                    event.scheduled = Some(best);
                    let end = best + event.duration().unwrap_or_else(Duration::zero);
                    blocks.push(Block::new(best, end));
                    outcome.scheduled.push(event);
                }
                None => {
                    tracing::debug!(event = %event, "unable to find a good time");
                    event.scheduled = None;
                    outcome.unschedulable.push(event);
                }
            }
        }

        outcome
    }

    /// Earliest minute reaching the highest suitability among viable ones.
    fn best_time(
        &self,
        schedule: &Schedule,
        availability: &[Interval],
        placed: &[Event],
        event: &Event,
    ) -> Option<DateTime<Utc>> {
        let step = Duration::minutes(self.config.step_minutes.max(1));
        let mut best: Option<(DateTime<Utc>, f64)> = None;

        for &(start, end) in availability {
            let mut minute = start;
            while minute < end {
                if viable_at(schedule, minute, end, event) {
                    let score = suitability(schedule, minute, placed, event);
                    if best.map_or(true, |(_, highest)| score > highest) {
                        best = Some((minute, score));
                    }
                }
                minute += step;
            }
        }

        best.map(|(minute, _)| minute)
    }
}

impl Default for AutoScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `event` may start at `minute` inside a free interval ending at
/// `interval_end`.
pub fn viable_at(
    schedule: &Schedule,
    minute: DateTime<Utc>,
    interval_end: DateTime<Utc>,
    event: &Event,
) -> bool {
    if event.has_flag(Flag::NoBox) {
        return false;
    }
    if event.inception.is_some_and(|inception| inception > minute) {
        return false;
    }
    if event
        .duration()
        .is_some_and(|duration| minute + duration > interval_end)
    {
        return false;
    }
    if !event.has_flag(Flag::Flex) {
        if let Some((earliest, latest)) = event.day_part_window() {
            let local = schedule.local_time(minute);
            if local < earliest || local > latest {
                return false;
            }
        }
    }
    true
}
