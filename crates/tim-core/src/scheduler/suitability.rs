//! Placement quality of one event at one candidate minute.
//!
//! Unlike priority, which ranks events, suitability ranks *times* for a
//! single event. The score is the mean of a fixed leading zero and whichever
//! of the factors below apply.

use chrono::{DateTime, Utc};

use crate::event::Event;
use crate::schedule::{ReschedulingBehavior, Schedule};

const DAY_PART_MATCH: f64 = 10.0;
const DAY_PART_MISS: f64 = -10.0;
const CONSISTENCY_MAX: f64 = 12.0;
const CONSISTENCY_DECAY_PER_HOUR: f64 = 6.0;

/// Suitability of placing `event` at `minute`, given the events already
/// placed earlier in this run.
pub fn suitability(
    schedule: &Schedule,
    minute: DateTime<Utc>,
    already_scheduled: &[Event],
    event: &Event,
) -> f64 {
    let mut factors: Vec<f64> = vec![0.0];

    // Day-part preference, scored even for flex events
    if let Some((earliest, latest)) = event.day_part_window() {
        let local = schedule.local_time(minute);
        if local < earliest || local > latest {
            factors.push(DAY_PART_MISS);
        } else {
            factors.push(DAY_PART_MATCH);
        }
    }

    // Context continuity with whatever runs just before
    let prior = already_scheduled
        .iter()
        .filter(|other| other.scheduled.is_some_and(|at| at < minute))
        .max_by_key(|other| other.scheduled);
    if let Some(prior) = prior {
        let shared = prior.contexts.intersection(&event.contexts).count();
        factors.push(shared as f64);
    }

    // Stay close to the previous placement
    if schedule.rescheduling_behavior == ReschedulingBehavior::Consistency {
        if let Some(previous) = event.scheduled {
            let hours = (previous - minute).num_seconds().abs() as f64 / 3600.0;
            factors.push(f64::max(
                0.0,
                CONSISTENCY_MAX - CONSISTENCY_DECAY_PER_HOUR * hours,
            ));
        }
    }

    factors.iter().sum::<f64>() / factors.len() as f64
}
