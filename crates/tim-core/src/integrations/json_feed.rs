//! Local JSON feed integration.
//!
//! Reads a document shaped like
//!
//! ```json
//! {
//!   "pending":   [{ "id": "T-1", "content": "Write report", "labels": ["p1", "work"] }],
//!   "completed": [{ "id": "T-0", "content": "Triage", "completed_at": "2024-03-04T08:00:00Z" }],
//!   "blocks":    [{ "start": "2024-03-04T10:00:00Z", "end": "2024-03-04T11:00:00Z" }]
//! }
//! ```
//!
//! The file is re-read on every call, so whatever produces it (an export
//! script, a sync daemon) can update it between cycles. Labels that name a
//! recognized [`Flag`] become flags; every other label becomes a context.
//!
//! Published events are written as calendar-style [`PublishedEvent`]
//! entries, each carrying the event's plain-text description.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::traits::{IntegrationResult, Integrator, IntegratorProvider};
use crate::event::{Event, Flag};
use crate::schedule::Block;
use crate::storage::FeedConfig;

/// One task in a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub content: String,
    /// When the task was created; the earliest it may be placed.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Do-after date, or the deadline when labelled `deadline`.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub progression: Option<String>,
    #[serde(default)]
    pub progression_order: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One busy interval in a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `false` for tentative or transparent entries, which do not block time.
    #[serde(default = "default_busy")]
    pub busy: bool,
}

fn default_busy() -> bool {
    true
}

/// The whole feed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub pending: Vec<FeedItem>,
    #[serde(default)]
    pub completed: Vec<FeedItem>,
    #[serde(default)]
    pub blocks: Vec<FeedBlock>,
}

/// One entry of a feed's published output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub uuid: Uuid,
    pub source_id: String,
    pub summary: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub completed: bool,
    pub description: String,
}

impl PublishedEvent {
    /// Dependencies in the description are resolved against `batch`.
    pub fn new(event: &Event, batch: &[Event]) -> Self {
        Self {
            uuid: event.uuid,
            source_id: event.source_id.clone(),
            summary: event.content.clone(),
            start: event.scheduled,
            end: event.expected_end(),
            completed: event.completed,
            description: event.description(batch),
        }
    }
}

/// Integrator backed by a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFeedIntegrator {
    name: String,
    path: PathBuf,
    output: Option<PathBuf>,
    buffer: Duration,
}

impl JsonFeedIntegrator {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            output: None,
            buffer: Duration::zero(),
        }
    }

    pub fn from_config(feed: &FeedConfig) -> Self {
        Self {
            name: feed.name.clone(),
            path: feed.path.clone(),
            output: feed.output.clone(),
            buffer: Duration::minutes(feed.buffer_minutes),
        }
    }

    /// Write published events to `output`.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Widen every busy block by `minutes` on both sides.
    pub fn with_buffer_minutes(mut self, minutes: i64) -> Self {
        self.buffer = Duration::minutes(minutes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> IntegrationResult<FeedDocument> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("cannot read feed {}: {e}", self.path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Convert a feed item into a typed event.
    fn to_event(&self, item: &FeedItem) -> IntegrationResult<Event> {
        let mut event = Event::new(self.name.as_str(), self.source_id(item), item.content.trim());

        for label in &item.labels {
            match label.parse::<Flag>() {
                Ok(flag) => {
                    event.flags.insert(flag);
                }
                Err(_) => {
                    event.contexts.insert(label.clone());
                }
            }
        }

        event.inception = item.created;
        if let Some(due) = item.due {
            if event.has_flag(Flag::Deadline) {
                event.deadline = Some(due);
            } else {
                event.inception = Some(due);
            }
        }
        event.duration = item.duration_minutes.map(|minutes| minutes * 60);
        if item.recurring {
            event.recurrence_id = self.item_key(item);
        }
        if let Some(progression) = &item.progression {
            event = event.with_progression(progression.clone(), item.progression_order);
        }
        event.source_url = item.url.clone();
        event.source_metadata = serde_json::to_value(item)?;
        Ok(event)
    }

    fn item_key(&self, item: &FeedItem) -> String {
        format!("{}:{}", self.name, item.id)
    }

    /// Stable source id. Each instance of a recurring item is keyed by its
    /// due date so it is tracked as its own event.
    fn source_id(&self, item: &FeedItem) -> String {
        match (item.recurring, item.due) {
            (true, Some(due)) => format!("{}@{}", self.item_key(item), due.date_naive()),
            _ => self.item_key(item),
        }
    }
}

impl Integrator for JsonFeedIntegrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_pending_events(&self, until: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
        let document = self.read()?;
        let mut events = Vec::with_capacity(document.pending.len());
        for item in &document.pending {
            let event = self.to_event(item)?;
            if event.inception.is_some_and(|inception| inception > until) {
                continue;
            }
            events.push(event);
        }
        tracing::debug!(feed = %self.name, count = events.len(), "read pending events");
        Ok(events)
    }

    fn get_completed_events(&self, after: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
        let document = self.read()?;
        let mut events = Vec::new();
        for item in &document.completed {
            if item.completed_at.is_some_and(|at| at < after) {
                continue;
            }
            let mut event = self.to_event(item)?;
            event.completed = true;
            event.completed_at = item.completed_at;
            // A finished instance must not close the open one that followed it
            event.recurrence_id.clear();
            events.push(event);
        }
        tracing::debug!(feed = %self.name, count = events.len(), "read completed events");
        Ok(events)
    }

    fn get_blocks(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> IntegrationResult<Vec<Block>> {
        let document = self.read()?;
        let blocks: Vec<Block> = document
            .blocks
            .iter()
            .filter(|block| block.busy)
            .map(|block| Block::buffered(block.start, block.end, self.buffer))
            .filter(|block| block.overlaps(after, until))
            .collect();
        tracing::debug!(feed = %self.name, count = blocks.len(), "read busy blocks");
        Ok(blocks)
    }

    fn write_events(&self, events: &[Event]) -> IntegrationResult<()> {
        let Some(output) = &self.output else {
            return Ok(());
        };
        let published: Vec<PublishedEvent> = events
            .iter()
            .map(|event| PublishedEvent::new(event, events))
            .collect();
        let content = serde_json::to_string_pretty(&published)?;
        std::fs::write(output, content)
            .map_err(|e| format!("cannot write {}: {e}", output.display()))?;
        tracing::debug!(feed = %self.name, count = events.len(), "published events");
        Ok(())
    }
}

/// Provides the configured JSON feeds of each schedule.
#[derive(Debug, Clone, Default)]
pub struct FeedProvider {
    feeds: Vec<FeedConfig>,
}

impl FeedProvider {
    pub fn new(feeds: Vec<FeedConfig>) -> Self {
        Self { feeds }
    }
}

impl IntegratorProvider for FeedProvider {
    fn integrators(&self, schedule_id: i64) -> Vec<Arc<dyn Integrator>> {
        self.feeds
            .iter()
            .filter(|feed| feed.schedule_id == schedule_id)
            .map(|feed| Arc::new(JsonFeedIntegrator::from_config(feed)) as Arc<dyn Integrator>)
            .collect()
    }
}
