//! Merging of integration data into the persisted event set.
//!
//! Integrations deliver fresh copies of the events they own on every cycle.
//! The reconciler matches them against the stored events by `source_id`,
//! adopts changed values, adds unknown events and retires older instances of
//! recurring events. Nothing is ever removed from the list.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Incoming events with no stored counterpart.
    pub added: usize,
    /// Stored events that adopted at least one incoming value.
    pub merged: usize,
    /// Stored events that already matched their incoming copy.
    pub unchanged: usize,
    /// Events marked completed because a newer instance of the same
    /// recurrence arrived.
    pub superseded: usize,
}

impl ReconcileSummary {
    /// Whether the pass changed anything.
    pub fn has_changes(&self) -> bool {
        self.added + self.merged + self.superseded > 0
    }
}

/// Reconciles incoming events into one schedule's event list.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    schedule_id: i64,
}

impl Reconciler {
    pub fn new(schedule_id: i64) -> Self {
        Self { schedule_id }
    }

    /// Merge `incoming` into `events` in place.
    ///
    /// Incoming events are processed one at a time, in order. An empty or
    /// partial `incoming` list leaves every unmentioned event untouched.
    pub fn reconcile(&self, events: &mut Vec<Event>, incoming: Vec<Event>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for mut fresh in incoming {
            let source_id = fresh.source_id.clone();
            let recurrence_id = fresh.recurrence_id.clone();

            match events.iter_mut().find(|e| e.source_id == source_id) {
                Some(stored) => {
                    if merge(stored, &fresh) {
                        tracing::debug!(event = %stored, "merged incoming changes");
                        summary.merged += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
                None => {
                    fresh.schedule_id = self.schedule_id;
                    tracing::debug!(event = %fresh, "added new event");
                    events.push(fresh);
                    summary.added += 1;
                }
            }

            if !recurrence_id.is_empty() {
                summary.superseded += supersede(events, &recurrence_id, &source_id);
            }
        }

        summary
    }
}

/// Copy every non-default incoming value that differs from the stored one.
fn merge(stored: &mut Event, incoming: &Event) -> bool {
    let mut changed = false;
    changed |= adopt(&mut stored.content, &incoming.content);
    changed |= adopt(&mut stored.inception, &incoming.inception);
    changed |= adopt(&mut stored.deadline, &incoming.deadline);
    changed |= adopt(&mut stored.duration, &incoming.duration);
    changed |= adopt(&mut stored.completed, &incoming.completed);
    changed |= adopt(&mut stored.completed_at, &incoming.completed_at);
    changed |= adopt(&mut stored.flags, &incoming.flags);
    changed |= adopt(&mut stored.contexts, &incoming.contexts);
    changed |= adopt(&mut stored.progression, &incoming.progression);
    changed |= adopt(&mut stored.progression_order, &incoming.progression_order);
    changed |= adopt(&mut stored.source_metadata, &incoming.source_metadata);
    changed |= adopt(&mut stored.recurrence_id, &incoming.recurrence_id);
    changed |= adopt(&mut stored.source_url, &incoming.source_url);
    changed
}

fn adopt<T: Clone + Default + PartialEq>(stored: &mut T, incoming: &T) -> bool {
    if *incoming == T::default() || *incoming == *stored {
        return false;
    }
    *stored = incoming.clone();
    true
}

/// Mark every other open instance of a recurrence completed.
fn supersede(events: &mut [Event], recurrence_id: &str, current_source_id: &str) -> usize {
    let mut count = 0;
    for event in events
        .iter_mut()
        .filter(|e| e.recurrence_id == recurrence_id && e.source_id != current_source_id)
    {
        if !event.completed {
            tracing::debug!(event = %event, "superseded by newer recurrence");
            event.completed = true;
            count += 1;
        }
    }
    count
}
