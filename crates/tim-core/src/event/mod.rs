//! Schedulable events.
//!
//! An [`Event`] is one unit of work owned by a schedule. Events arrive from
//! integrations (or are created by hand), get merged into the persisted set
//! by the reconciler and receive a `scheduled` start time from the greedy
//! scheduler. They are never deleted; a superseded event is simply marked
//! completed.

mod flags;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub use flags::{DayPart, Flag};

/// A schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uuid: Uuid,
    pub schedule_id: i64,
    pub content: String,
    /// Earliest time the event may be placed.
    pub inception: Option<DateTime<Utc>>,
    /// Raises urgency; never makes a placement unviable.
    pub deadline: Option<DateTime<Utc>>,
    /// Expected length in seconds.
    pub duration: Option<i64>,
    /// Assigned start time. `None` means not placed.
    pub scheduled: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flags: BTreeSet<Flag>,
    #[serde(default)]
    pub contexts: BTreeSet<String>,
    pub progression: Option<String>,
    #[serde(default)]
    pub progression_order: i64,
    pub source: String,
    pub source_id: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub recurrence_id: String,
    #[serde(default)]
    pub source_metadata: serde_json::Value,
    /// Last cycle in which the persisted state of this event changed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create an event coming from `source` with the given source-side id.
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            schedule_id: 0,
            content: content.into(),
            inception: None,
            deadline: None,
            duration: None,
            scheduled: None,
            completed: false,
            completed_at: None,
            flags: BTreeSet::new(),
            contexts: BTreeSet::new(),
            progression: None,
            progression_order: 0,
            source: source.into(),
            source_id: source_id.into(),
            source_url: String::new(),
            recurrence_id: String::new(),
            source_metadata: serde_json::Value::Null,
            updated_at: None,
        }
    }

    /// Create a hand-made event. Its source id is its own uuid.
    pub fn manual(content: impl Into<String>) -> Self {
        let mut event = Self::new("manual", "", content);
        event.source_id = event.uuid.to_string();
        event
    }

    pub fn with_schedule(mut self, schedule_id: i64) -> Self {
        self.schedule_id = schedule_id;
        self
    }

    pub fn with_duration_minutes(mut self, minutes: i64) -> Self {
        self.duration = Some(minutes * 60);
        self
    }

    pub fn with_inception(mut self, inception: DateTime<Utc>) -> Self {
        self.inception = Some(inception);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_scheduled(mut self, scheduled: DateTime<Utc>) -> Self {
        self.scheduled = Some(scheduled);
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.insert(context.into());
        self
    }

    pub fn with_progression(mut self, name: impl Into<String>, order: i64) -> Self {
        self.progression = Some(name.into());
        self.progression_order = order;
        self
    }

    pub fn with_recurrence(mut self, recurrence_id: impl Into<String>) -> Self {
        self.recurrence_id = recurrence_id.into();
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed = true;
        self.completed_at = Some(at);
        self
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::seconds)
    }

    /// `scheduled + duration`, treating a missing duration as zero.
    pub fn expected_end(&self) -> Option<DateTime<Utc>> {
        self.scheduled
            .map(|start| start + self.duration().unwrap_or_else(Duration::zero))
    }

    /// Whether the event is running at `now`, allowing `grace` past its
    /// expected end before it counts as abandoned.
    pub fn is_ongoing(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match (self.scheduled, self.expected_end()) {
            (Some(start), Some(end)) => start <= now && now < end + grace,
            _ => false,
        }
    }

    /// Union of the day-part ranges asserted by this event's flags.
    pub fn day_part_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        self.flags
            .iter()
            .filter_map(Flag::day_part)
            .map(|part| part.range())
            .reduce(|(earliest, latest), (start, end)| (earliest.min(start), latest.max(end)))
    }

    /// Incomplete events earlier in the same progression, in order.
    pub fn dependencies<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        self.progression_peers(events, |order| order < self.progression_order)
    }

    /// Incomplete events later in the same progression, in order.
    pub fn dependents<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        self.progression_peers(events, |order| order > self.progression_order)
    }

    fn progression_peers<'a>(
        &self,
        events: &'a [Event],
        keep: impl Fn(i64) -> bool,
    ) -> Vec<&'a Event> {
        let Some(progression) = self.progression.as_deref() else {
            return Vec::new();
        };
        let mut peers: Vec<&Event> = events
            .iter()
            .filter(|e| e.uuid != self.uuid && !e.completed)
            .filter(|e| e.progression.as_deref() == Some(progression))
            .filter(|e| keep(e.progression_order))
            .collect();
        peers.sort_by_key(|e| e.progression_order);
        peers
    }

    /// Plain-text summary used when publishing to calendars.
    pub fn description(&self, events: &[Event]) -> String {
        let mut lines = Vec::new();
        if !self.flags.is_empty() {
            let flags: Vec<&str> = self.flags.iter().map(Flag::as_str).collect();
            lines.push(format!("Flags: {}", flags.join(", ")));
        }
        if !self.contexts.is_empty() {
            let contexts: Vec<&str> = self.contexts.iter().map(String::as_str).collect();
            lines.push(format!("Contexts: {}", contexts.join(", ")));
        }
        if let Some(deadline) = self.deadline {
            lines.push(format!("Deadline: {}", deadline.to_rfc3339()));
        }
        let dependencies = self.dependencies(events);
        if !dependencies.is_empty() {
            lines.push("Waiting on:".to_string());
            lines.extend(dependencies.iter().map(|e| format!("- {}", e.content)));
        }
        let dependents = self.dependents(events);
        if !dependents.is_empty() {
            lines.push("Blocking:".to_string());
            lines.extend(dependents.iter().map(|e| format!("- {}", e.content)));
        }
        if !self.source_url.is_empty() {
            lines.push(format!("Source: {}", self.source_url));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.content, self.source, self.source_id)
    }
}
