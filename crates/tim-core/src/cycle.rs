//! The per-schedule scheduling cycle.
//!
//! One cycle runs, for a single schedule:
//!
//! 1. Fetch pending and completed events and busy blocks from every
//!    integrator
//! 2. Reconcile the fetched events into the stored set
//! 3. Run maintenance rules
//! 4. Build a schedule for the current working window
//! 5. Persist every changed event in one transaction
//! 6. Publish recently changed events back to the integrators
//!
//! Cycles of the same schedule never overlap: each holds that schedule's
//! async lock from start to finish. Cycles of different schedules run in
//! parallel. Integrator calls are blocking, so each runs on the blocking
//! pool under a timeout; a failed or slow integrator is logged and recorded
//! in the report without aborting the cycle. Store failures do abort it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{CoreError, Result, StoreError};
use crate::event::Event;
use crate::integrations::{IntegrationResult, Integrator, IntegratorProvider};
use crate::maintenance::{Maintenance, MaintenanceReport};
use crate::reconciliation::{ReconcileSummary, Reconciler};
use crate::schedule::Block;
use crate::scheduler::AutoScheduler;
use crate::storage::{CycleConfig, EventStore};

/// Runtime settings of the cycle runner.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Upper bound for each integrator call
    pub integration_timeout: StdDuration,
    /// Events changed within this distance of now are published
    pub publish_window: chrono::Duration,
    /// Enable the conflicting-placement maintenance rule
    pub clear_conflicting: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from(&CycleConfig::default())
    }
}

impl From<&CycleConfig> for CycleSettings {
    fn from(config: &CycleConfig) -> Self {
        Self {
            integration_timeout: StdDuration::from_secs(config.integration_timeout_secs),
            publish_window: chrono::Duration::days(config.publish_window_days),
            clear_conflicting: config.clear_conflicting,
        }
    }
}

/// A failed or timed-out integrator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationFailure {
    pub integrator: String,
    pub operation: String,
    pub message: String,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub schedule_id: i64,
    /// Scheduling window, `None` outside working hours.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub reconcile: ReconcileSummary,
    pub maintenance: MaintenanceReport,
    pub scheduled: usize,
    pub unschedulable: usize,
    /// Events whose stored state changed.
    pub changed: usize,
    /// Events handed to integrators for publishing.
    pub published: usize,
    pub failures: Vec<IntegrationFailure>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs scheduling cycles against a store and a set of integrators.
pub struct CycleRunner {
    store: Arc<dyn EventStore>,
    provider: Arc<dyn IntegratorProvider>,
    settings: CycleSettings,
    scheduler: AutoScheduler,
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl CycleRunner {
    pub fn new(
        store: Arc<dyn EventStore>,
        provider: Arc<dyn IntegratorProvider>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
            scheduler: AutoScheduler::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    fn schedule_lock(&self, schedule_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(schedule_id).or_default())
    }

    /// Drop the lock entry once no other cycle holds or awaits it.
    fn release_lock(&self, schedule_id: i64, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&schedule_id);
        }
    }

    /// Run one cycle for `schedule_id` at `now`.
    ///
    /// # Errors
    /// Fails when the schedule does not exist or the store cannot be read or
    /// written. Integrator failures are reported in [`CycleReport::failures`].
    pub async fn run_cycle(&self, schedule_id: i64, now: DateTime<Utc>) -> Result<CycleReport> {
        let lock = self.schedule_lock(schedule_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(schedule_id, now).await
        };
        self.release_lock(schedule_id, lock);
        result
    }

    async fn run_locked(&self, schedule_id: i64, now: DateTime<Utc>) -> Result<CycleReport> {
        let schedule = self
            .with_store(move |store| store.load_schedule(schedule_id))
            .await?
            .ok_or(CoreError::ScheduleNotFound(schedule_id))?;
        let mut events = self
            .with_store(move |store| store.load_events(schedule_id))
            .await?;
        let before: HashMap<Uuid, Event> =
            events.iter().map(|e| (e.uuid, e.clone())).collect();

        let window = schedule.current_window(now);
        let mut report = CycleReport {
            schedule_id,
            window,
            ..CycleReport::default()
        };
        tracing::info!(schedule_id, events = events.len(), ?window, "cycle started");

        // Fetch
        let integrators = self.provider.integrators(schedule_id);
        let until = window.map_or(now, |(_, end)| end);
        let completed_after = now - self.settings.publish_window;
        let mut incoming = Vec::new();
        let mut blocks: Vec<Block> = Vec::new();
        for integrator in &integrators {
            if let Some(pending) = self
                .call(integrator, "get_pending_events", &mut report.failures, move |i| {
                    i.get_pending_events(until)
                })
                .await
            {
                incoming.extend(pending);
            }
            if let Some(completed) = self
                .call(integrator, "get_completed_events", &mut report.failures, move |i| {
                    i.get_completed_events(completed_after)
                })
                .await
            {
                incoming.extend(completed);
            }
            if let Some((start, end)) = window {
                if let Some(busy) = self
                    .call(integrator, "get_blocks", &mut report.failures, move |i| {
                        i.get_blocks(start, end)
                    })
                    .await
                {
                    blocks.extend(busy);
                }
            }
        }

        // Reconcile and maintain
        report.reconcile = Reconciler::new(schedule_id).reconcile(&mut events, incoming);
        report.maintenance = Maintenance::new(self.settings.clear_conflicting)
            .run(&schedule, &mut events, &blocks, now);

        // Schedule
        match window {
            Some(window) => {
                let outcome = self
                    .scheduler
                    .build_schedule(&schedule, &events, &blocks, window, now);
                report.scheduled = outcome.scheduled.len();
                report.unschedulable = outcome.unschedulable.len();
                let mut placed: HashMap<Uuid, Event> = outcome
                    .into_events()
                    .into_iter()
                    .map(|e| (e.uuid, e))
                    .collect();
                for event in events.iter_mut() {
                    if let Some(updated) = placed.remove(&event.uuid) {
                        *event = updated;
                    }
                }
            }
            None => tracing::info!(schedule_id, "outside working hours, not scheduling"),
        }

        // Persist
        for event in events.iter_mut() {
            if before.get(&event.uuid) != Some(&*event) {
                event.updated_at = Some(now);
                report.changed += 1;
            }
        }
        let to_save = events.clone();
        self.with_store(move |store| store.save_events(schedule_id, &to_save))
            .await?;

        // Publish
        let publish_after = now - self.settings.publish_window;
        let recent: Arc<Vec<Event>> = Arc::new(
            events
                .into_iter()
                .filter(|e| e.updated_at.is_some_and(|at| at >= publish_after && at <= now))
                .collect(),
        );
        report.published = recent.len();
        if !recent.is_empty() {
            for integrator in &integrators {
                let recent = Arc::clone(&recent);
                self.call(integrator, "write_events", &mut report.failures, move |i| {
                    i.write_events(&recent)
                })
                .await;
            }
        }

        tracing::info!(
            schedule_id,
            added = report.reconcile.added,
            scheduled = report.scheduled,
            unschedulable = report.unschedulable,
            changed = report.changed,
            failures = report.failures.len(),
            "cycle finished"
        );
        Ok(report)
    }

    /// Run one cycle per stored schedule, in parallel.
    ///
    /// Results are ordered by schedule id. A failing schedule does not stop
    /// the others.
    pub async fn run_all(
        self: &Arc<Self>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(i64, Result<CycleReport>)>> {
        let schedules = self.with_store(|store| store.list_schedules()).await?;

        let mut cycles = JoinSet::new();
        for schedule in schedules {
            let runner = Arc::clone(self);
            cycles.spawn(async move { (schedule.id, runner.run_cycle(schedule.id, now).await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok((schedule_id, result)) => {
                    if let Err(e) = &result {
                        tracing::error!(schedule_id, error = %e, "cycle failed");
                    }
                    results.push((schedule_id, result));
                }
                Err(e) => tracing::error!(error = %e, "cycle task aborted"),
            }
        }
        results.sort_by_key(|(schedule_id, _)| *schedule_id);
        Ok(results)
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn EventStore) -> std::result::Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || f(store.as_ref())).await??)
    }

    /// Run one blocking integrator call under the configured timeout.
    ///
    /// A call that times out keeps running on the blocking pool; its result
    /// is discarded.
    async fn call<T, F>(
        &self,
        integrator: &Arc<dyn Integrator>,
        operation: &str,
        failures: &mut Vec<IntegrationFailure>,
        f: F,
    ) -> Option<T>
    where
        F: FnOnce(&dyn Integrator) -> IntegrationResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = integrator.name().to_string();
        let timeout = self.settings.integration_timeout;
        let integrator = Arc::clone(integrator);
        let task = tokio::task::spawn_blocking(move || f(integrator.as_ref()));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(CoreError::integration(service.as_str(), e)),
            Ok(Err(join)) => Err(CoreError::Join(join)),
            Err(_) => Err(CoreError::Timeout {
                service: service.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    integrator = %service,
                    operation,
                    error = %e,
                    "integration call failed"
                );
                failures.push(IntegrationFailure {
                    integrator: service,
                    operation: operation.to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Flag;
    use crate::integrations::NoIntegrators;
    use crate::schedule::Schedule;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Weekday};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // 2024-03-04 is a Monday
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[derive(Default)]
    struct StaticIntegrator {
        pending: Vec<Event>,
        blocks: Vec<Block>,
        written: Mutex<Vec<Event>>,
    }

    impl Integrator for StaticIntegrator {
        fn name(&self) -> &str {
            "static"
        }

        fn get_pending_events(&self, _until: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
            Ok(self.pending.clone())
        }

        fn get_blocks(
            &self,
            _after: DateTime<Utc>,
            _until: DateTime<Utc>,
        ) -> IntegrationResult<Vec<Block>> {
            Ok(self.blocks.clone())
        }

        fn write_events(&self, events: &[Event]) -> IntegrationResult<()> {
            self.written.lock().unwrap().extend_from_slice(events);
            Ok(())
        }
    }

    struct Failing;

    impl Integrator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn get_pending_events(&self, _until: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
            Err("service unavailable".into())
        }
    }

    struct Slow;

    impl Integrator for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn get_pending_events(&self, _until: DateTime<Utc>) -> IntegrationResult<Vec<Event>> {
            std::thread::sleep(StdDuration::from_millis(500));
            Ok(vec![Event::new("slow", "late", "too late")])
        }
    }

    struct Fixed(Vec<Arc<dyn Integrator>>);

    impl IntegratorProvider for Fixed {
        fn integrators(&self, _schedule_id: i64) -> Vec<Arc<dyn Integrator>> {
            self.0.clone()
        }
    }

    fn static_feed() -> Arc<StaticIntegrator> {
        Arc::new(StaticIntegrator {
            pending: vec![
                Event::new("static", "1", "write").with_duration_minutes(30),
                Event::new("static", "2", "plan")
                    .with_duration_minutes(60)
                    .with_flag(Flag::P1),
            ],
            blocks: vec![Block::new(at(9, 0), at(9, 30))],
            ..Default::default()
        })
    }

    fn setup(integrators: Vec<Arc<dyn Integrator>>) -> (Arc<MemoryStore>, CycleRunner, i64) {
        let store = Arc::new(MemoryStore::new());
        let id = store.save_schedule(&Schedule::new("ada", chrono_tz::UTC)).unwrap();
        let runner = CycleRunner::new(
            store.clone(),
            Arc::new(Fixed(integrators)),
            CycleSettings::default(),
        );
        (store, runner, id)
    }

    fn by_source(events: &[Event], source_id: &str) -> Event {
        events
            .iter()
            .find(|e| e.source_id == source_id)
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn cycle_reconciles_schedules_and_publishes() {
        let feed = static_feed();
        let (store, runner, id) = setup(vec![feed.clone() as Arc<dyn Integrator>]);

        let report = runner.run_cycle(id, at(9, 0)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.window, Some((at(9, 0), at(22, 0))));
        assert_eq!(report.reconcile.added, 2);
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.changed, 2);

        let events = store.load_events(id).unwrap();
        assert_eq!(by_source(&events, "2").scheduled, Some(at(9, 30)));
        assert_eq!(by_source(&events, "1").scheduled, Some(at(10, 30)));
        assert!(events.iter().all(|e| e.updated_at == Some(at(9, 0))));
        assert!(events.iter().all(|e| e.schedule_id == id));

        assert_eq!(report.published, 2);
        assert_eq!(feed.written.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn repeated_cycle_changes_nothing() {
        let feed = static_feed();
        let (store, runner, id) = setup(vec![feed as Arc<dyn Integrator>]);

        runner.run_cycle(id, at(9, 0)).await.unwrap();
        let first = store.load_events(id).unwrap();

        let report = runner.run_cycle(id, at(9, 0)).await.unwrap();
        assert_eq!(report.reconcile.unchanged, 2);
        assert_eq!(report.changed, 0);
        assert_eq!(store.load_events(id).unwrap(), first);
    }

    #[tokio::test]
    async fn failing_integrator_is_isolated() {
        let feed = static_feed();
        let (store, runner, id) = setup(vec![
            Arc::new(Failing) as Arc<dyn Integrator>,
            feed as Arc<dyn Integrator>,
        ]);

        let report = runner.run_cycle(id, at(9, 0)).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].integrator, "failing");
        assert_eq!(report.failures[0].operation, "get_pending_events");
        assert!(report.failures[0].message.contains("service unavailable"));
        assert_eq!(store.load_events(id).unwrap().len(), 2);
        assert_eq!(report.scheduled, 2);
    }

    #[tokio::test]
    async fn slow_integrator_times_out() {
        let store = Arc::new(MemoryStore::new());
        let id = store.save_schedule(&Schedule::new("ada", chrono_tz::UTC)).unwrap();
        let settings = CycleSettings {
            integration_timeout: StdDuration::from_millis(50),
            ..CycleSettings::default()
        };
        let runner = CycleRunner::new(
            store.clone(),
            Arc::new(Fixed(vec![Arc::new(Slow) as Arc<dyn Integrator>])),
            settings,
        );

        let report = runner.run_cycle(id, at(9, 0)).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("timed out"));
        assert!(store.load_events(id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_schedule_is_an_error() {
        let (_store, runner, id) = setup(Vec::new());
        let err = runner.run_cycle(id + 10, at(9, 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::ScheduleNotFound(_)));
        assert!(runner.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_day_reconciles_without_scheduling() {
        let store = Arc::new(MemoryStore::new());
        let mut schedule = Schedule::new("ada", chrono_tz::UTC);
        schedule.active_days = vec![Weekday::Sat, Weekday::Sun];
        let id = store.save_schedule(&schedule).unwrap();
        let runner = CycleRunner::new(
            store.clone(),
            Arc::new(Fixed(vec![static_feed() as Arc<dyn Integrator>])),
            CycleSettings::default(),
        );

        let report = runner.run_cycle(id, at(9, 0)).await.unwrap();
        assert_eq!(report.window, None);
        assert_eq!(report.reconcile.added, 2);
        assert_eq!(report.scheduled, 0);
        assert!(store.load_events(id).unwrap().iter().all(|e| e.scheduled.is_none()));
    }

    #[tokio::test]
    async fn concurrent_cycles_of_one_schedule_are_serialized() {
        let (store, runner, id) = setup(vec![static_feed() as Arc<dyn Integrator>]);
        let (a, b) = tokio::join!(runner.run_cycle(id, at(9, 0)), runner.run_cycle(id, at(9, 0)));
        let added = a.unwrap().reconcile.added + b.unwrap().reconcile.added;
        assert_eq!(added, 2);
        assert_eq!(store.load_events(id).unwrap().len(), 2);
        assert!(runner.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_all_covers_every_schedule() {
        let store = Arc::new(MemoryStore::new());
        let first = store.save_schedule(&Schedule::new("ada", chrono_tz::UTC)).unwrap();
        let second = store.save_schedule(&Schedule::new("grace", chrono_tz::UTC)).unwrap();
        let runner = Arc::new(CycleRunner::new(
            store.clone(),
            Arc::new(NoIntegrators),
            CycleSettings::default(),
        ));

        let results = runner.run_all(at(9, 0)).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
    }
}
