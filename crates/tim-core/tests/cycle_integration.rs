//! Full cycles against a SQLite file and JSON feeds on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use tim_core::storage::FeedConfig;
use tim_core::{CycleRunner, CycleSettings, EventDb, EventStore, FeedProvider, Schedule};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

fn write_feed(path: &Path, document: serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
}

fn feed(schedule_id: i64, name: &str, path: PathBuf) -> FeedConfig {
    FeedConfig {
        schedule_id,
        name: name.to_string(),
        path,
        output: None,
        buffer_minutes: 0,
    }
}

struct Setup {
    dir: TempDir,
    db_path: PathBuf,
    schedule_id: i64,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tim.db");
        let db = EventDb::open(&db_path).unwrap();
        let schedule_id = db
            .save_schedule(&Schedule::new("ada", chrono_tz::UTC))
            .unwrap();
        Self {
            dir,
            db_path,
            schedule_id,
        }
    }

    fn feed_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.json"))
    }

    fn runner(&self, feeds: Vec<FeedConfig>) -> CycleRunner {
        let store = Arc::new(EventDb::open(&self.db_path).unwrap());
        CycleRunner::new(store, Arc::new(FeedProvider::new(feeds)), CycleSettings::default())
    }

    fn stored(&self) -> Vec<tim_core::Event> {
        let mut events = EventDb::open(&self.db_path)
            .unwrap()
            .load_events(self.schedule_id)
            .unwrap();
        events.sort_by(|a, b| a.content.cmp(&b.content));
        events
    }
}

#[tokio::test]
async fn early_completion_frees_time_for_the_next_task() {
    let setup = Setup::new();
    let path = setup.feed_path("todo");
    write_feed(
        &path,
        json!({
            "pending": [
                {"id": "a", "content": "a", "created": "2024-03-01T00:00:00Z",
                 "duration_minutes": 30, "labels": ["p1"]},
                {"id": "b", "content": "b", "created": "2024-03-01T00:00:00Z",
                 "duration_minutes": 30, "labels": ["p3"]}
            ],
            "blocks": [
                {"start": "2024-03-04T07:00:00Z", "end": "2024-03-04T08:00:00Z"}
            ]
        }),
    );
    let feeds = vec![feed(setup.schedule_id, "todo", path.clone())];

    let report = setup
        .runner(feeds.clone())
        .run_cycle(setup.schedule_id, at(7, 0))
        .await
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.reconcile.added, 2);
    assert_eq!(report.scheduled, 2);

    let events = setup.stored();
    assert_eq!(events[0].scheduled, Some(at(8, 0)));
    assert_eq!(events[1].scheduled, Some(at(8, 30)));

    // "a" finishes five minutes early
    write_feed(
        &path,
        json!({
            "pending": [
                {"id": "b", "content": "b", "created": "2024-03-01T00:00:00Z",
                 "duration_minutes": 30, "labels": ["p3"]}
            ],
            "completed": [
                {"id": "a", "content": "a", "created": "2024-03-01T00:00:00Z",
                 "duration_minutes": 30, "labels": ["p1"],
                 "completed_at": "2024-03-04T08:25:00Z"}
            ]
        }),
    );
    let report = setup
        .runner(feeds)
        .run_cycle(setup.schedule_id, at(8, 25))
        .await
        .unwrap();
    assert_eq!(report.reconcile.added, 0);
    assert_eq!(report.scheduled, 1);

    let events = setup.stored();
    assert_eq!(events.len(), 2);
    assert!(events[0].completed);
    assert_eq!(events[0].completed_at, Some(at(8, 25)));
    assert_eq!(events[1].scheduled, Some(at(8, 25)));
}

#[tokio::test]
async fn broken_feed_does_not_block_healthy_feed() {
    let setup = Setup::new();
    let good = setup.feed_path("good");
    let broken = setup.feed_path("broken");
    write_feed(
        &good,
        json!({
            "pending": [
                {"id": "1", "content": "review", "created": "2024-03-01T00:00:00Z",
                 "duration_minutes": 15}
            ]
        }),
    );
    std::fs::write(&broken, "{ not json").unwrap();

    let runner = setup.runner(vec![
        feed(setup.schedule_id, "broken", broken),
        feed(setup.schedule_id, "good", good),
    ]);
    let report = runner.run_cycle(setup.schedule_id, at(9, 0)).await.unwrap();

    assert!(!report.is_clean());
    assert!(report.failures.iter().all(|f| f.integrator == "broken"));
    assert_eq!(report.failures.len(), 3);
    assert_eq!(report.scheduled, 1);
    assert_eq!(setup.stored()[0].scheduled, Some(at(9, 0)));
}

#[tokio::test]
async fn run_all_keeps_schedules_apart() {
    let setup = Setup::new();
    let db = EventDb::open(&setup.db_path).unwrap();
    let mut early = Schedule::new("grace", chrono_tz::UTC);
    early.end_day_at = chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let early_id = db.save_schedule(&early).unwrap();

    let first = setup.feed_path("first");
    let second = setup.feed_path("second");
    for path in [&first, &second] {
        write_feed(
            path,
            json!({
                "pending": [
                    {"id": "1", "content": "task", "created": "2024-03-01T00:00:00Z",
                     "duration_minutes": 20}
                ]
            }),
        );
    }

    let runner = Arc::new(setup.runner(vec![
        feed(setup.schedule_id, "first", first),
        feed(early_id, "second", second),
    ]));
    let results = runner.run_all(at(10, 0)).await.unwrap();

    let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![setup.schedule_id, early_id]);
    for (_, result) in &results {
        assert_eq!(result.as_ref().unwrap().reconcile.added, 1);
    }

    let day = db.load_events(setup.schedule_id).unwrap();
    let done = db.load_events(early_id).unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(done.len(), 1);
    assert_eq!(day[0].scheduled, Some(at(10, 0)));
    // Working day already over
    assert_eq!(done[0].scheduled, None);
}

#[tokio::test]
async fn yesterdays_completion_keeps_todays_occurrence_open() {
    let setup = Setup::new();
    let path = setup.feed_path("todo");
    write_feed(
        &path,
        json!({
            "pending": [
                {"id": "R", "content": "stretch", "due": "2024-03-04T07:00:00Z",
                 "recurring": true, "duration_minutes": 15}
            ],
            "completed": [
                {"id": "R", "content": "stretch", "due": "2024-03-03T07:00:00Z",
                 "recurring": true, "duration_minutes": 15,
                 "completed_at": "2024-03-03T07:30:00Z"}
            ]
        }),
    );

    let report = setup
        .runner(vec![feed(setup.schedule_id, "todo", path)])
        .run_cycle(setup.schedule_id, at(9, 0))
        .await
        .unwrap();
    assert_eq!(report.reconcile.added, 2);
    assert_eq!(report.reconcile.superseded, 0);
    assert_eq!(report.scheduled, 1);

    let events = setup.stored();
    let today = events
        .iter()
        .find(|e| e.source_id == "todo:R@2024-03-04")
        .unwrap();
    assert!(!today.completed);
    assert_eq!(today.scheduled, Some(at(9, 0)));
    let yesterday = events
        .iter()
        .find(|e| e.source_id == "todo:R@2024-03-03")
        .unwrap();
    assert!(yesterday.completed);
}
