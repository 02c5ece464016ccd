//! In-memory [`EventStore`], used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{ensure_unique_sources, EventStore};
use crate::error::StoreError;
use crate::event::Event;
use crate::schedule::Schedule;

#[derive(Default)]
struct Inner {
    schedules: BTreeMap<i64, Schedule>,
    events: BTreeMap<i64, Vec<Event>>,
    next_id: i64,
}

/// Event store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Locked)
    }
}

impl EventStore for MemoryStore {
    fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        Ok(self.lock()?.schedules.values().cloned().collect())
    }

    fn load_schedule(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        Ok(self.lock()?.schedules.get(&id).cloned())
    }

    fn save_schedule(&self, schedule: &Schedule) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        let id = if schedule.id == 0 {
            let highest = inner.schedules.keys().max().copied().unwrap_or(0);
            let next = inner.next_id.max(highest) + 1;
            inner.next_id = next;
            next
        } else {
            schedule.id
        };
        let mut stored = schedule.clone();
        stored.id = id;
        inner.schedules.insert(id, stored);
        Ok(id)
    }

    fn load_events(&self, schedule_id: i64) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .lock()?
            .events
            .get(&schedule_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_events(&self, schedule_id: i64, events: &[Event]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner.events.entry(schedule_id).or_default();

        // Validate the merged result before touching anything
        let untouched = stored
            .iter()
            .filter(|e| !events.iter().any(|incoming| incoming.uuid == e.uuid));
        ensure_unique_sources(schedule_id, untouched.chain(events.iter()))?;

        for event in events {
            let mut event = event.clone();
            event.schedule_id = schedule_id;
            match stored.iter_mut().find(|e| e.uuid == event.uuid) {
                Some(existing) => *existing = event,
                None => stored.push(event),
            }
        }
        Ok(())
    }
}
