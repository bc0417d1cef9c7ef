use super::*;
use crate::clock::ManualClock;
use crate::executor::ExecutorError;
use crate::reporter::{ReportSink, SubmitOutcome};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// In-process executor returning scripted exit codes.
#[derive(Default)]
struct FakeExecutor {
    codes: HashMap<String, i32>,
    launch_failures: Vec<String>,
    delay: Duration,
    clock: Option<(Arc<ManualClock>, ChronoDuration)>,
    calls: SyncMutex<Vec<(String, String)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeExecutor {
    fn with_codes(codes: &[(&str, i32)]) -> Self {
        Self {
            codes: codes.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, name)| name.clone()).collect()
    }

    fn calls_for(&self, plugin: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(p, _)| p == plugin)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl JobExecutor for FakeExecutor {
    async fn execute(
        &self,
        job: &JobDescriptor,
        _env: &BTreeMap<String, String>,
    ) -> Result<i32, ExecutorError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.calls
            .lock()
            .push((job.plugin_id.clone(), job.name.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((clock, by)) = &self.clock {
            clock.advance(*by);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.launch_failures.contains(&job.name) {
            return Err(ExecutorError::Launch {
                path: job.executable().display().to_string(),
                message: "No such file or directory".to_string(),
            });
        }
        Ok(self.codes.get(&job.name).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct CollectingSink {
    runs: SyncMutex<Vec<JobRun>>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn submit(&self, run: &JobRun) -> SubmitOutcome {
        self.runs.lock().push(run.clone());
        SubmitOutcome::Accepted
    }
}

impl CollectingSink {
    async fn wait_for(&self, count: usize) -> Vec<JobRun> {
        for _ in 0..200 {
            if self.runs.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.runs.lock().clone()
    }
}

fn write_plugin(root: &Path, id: &str, jobs: serde_json::Value) {
    let dir = root.join(id);
    fs::create_dir_all(dir.join("jobs")).unwrap();
    fs::write(dir.join("plugin.json"), json!({"id": id, "jobs": jobs}).to_string()).unwrap();
}

fn job(name: &str, every: &str, reload: bool) -> serde_json::Value {
    json!({"name": name, "file": format!("{}.py", name), "every": every, "reload": reload})
}

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

struct Harness {
    scheduler: Scheduler,
    executor: Arc<FakeExecutor>,
    sink: Arc<CollectingSink>,
    clock: Arc<ManualClock>,
    _root: TempDir,
}

fn harness(root: TempDir, executor: FakeExecutor, clock: Arc<ManualClock>, workers: usize) -> Harness {
    let executor = Arc::new(executor);
    let sink = Arc::new(CollectingSink::default());
    let (reporter, _handle) = RunReporter::spawn(sink.clone(), 64, 0);
    let scheduler = Scheduler::new(
        SchedulerConfig {
            plugin_dirs: vec![root.path().to_path_buf()],
            max_workers: workers,
        },
        executor.clone(),
        reporter,
        clock.clone(),
    );
    Harness {
        scheduler,
        executor,
        sink,
        clock,
        _root: root,
    }
}

fn three_plugin_root() -> TempDir {
    let root = TempDir::new().unwrap();
    write_plugin(root.path(), "alpha", json!([job("a", "hour", false)]));
    write_plugin(root.path(), "bravo", json!([job("b", "day", false)]));
    write_plugin(root.path(), "charlie", json!([job("c", "*/5 * * * *", false)]));
    root
}

#[tokio::test]
async fn test_setup_creates_one_task_per_recurring_job() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(three_plugin_root(), FakeExecutor::default(), clock, 4);

    h.scheduler.setup().await;

    let tasks = h.scheduler.tasks().await;
    assert_eq!(tasks.len(), 3);
    let mut names: Vec<&str> = tasks.iter().map(|(n, _)| n.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);

    let next: HashMap<&str, _> = tasks.iter().map(|(n, t)| (n.as_str(), *t)).collect();
    assert_eq!(next["a"], start_time() + ChronoDuration::hours(1));
    assert_eq!(next["b"], start_time() + ChronoDuration::days(1));
    assert_eq!(next["c"], start_time() + ChronoDuration::minutes(5));
}

#[tokio::test]
async fn test_once_jobs_are_not_scheduled() {
    let root = TempDir::new().unwrap();
    write_plugin(
        root.path(),
        "alpha",
        json!([job("boot", "once", false), job("tick", "minute", false)]),
    );
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, FakeExecutor::default(), clock, 4);

    h.scheduler.setup().await;

    let tasks = h.scheduler.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0, "tick");
}

#[tokio::test]
async fn test_clear_removes_all_tasks() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(three_plugin_root(), FakeExecutor::default(), clock, 4);
    h.scheduler.setup().await;
    h.scheduler.clear().await;
    assert!(h.scheduler.tasks().await.is_empty());
}

#[tokio::test]
async fn test_run_once_success_codes() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("a", 0), ("b", 1), ("c", 0)]);
    let h = harness(three_plugin_root(), executor, clock, 4);

    assert!(h.scheduler.run_once().await);
    assert_eq!(h.executor.calls().len(), 3);
}

#[tokio::test]
async fn test_run_once_fails_on_code_two_but_runs_siblings() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("a", 2), ("b", 0), ("c", 1)]);
    let h = harness(three_plugin_root(), executor, clock, 4);

    assert!(!h.scheduler.run_once().await);
    assert_eq!(h.executor.calls().len(), 3);
}

#[tokio::test]
async fn test_run_once_fails_on_launch_error() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor {
        launch_failures: vec!["b".to_string()],
        ..FakeExecutor::default()
    };
    let h = harness(three_plugin_root(), executor, clock, 4);

    assert!(!h.scheduler.run_once().await);
    let runs = h.sink.wait_for(3).await;
    let b = runs.iter().find(|r| r.job_name == "b").unwrap();
    assert!(!b.success);
}

#[tokio::test]
async fn test_run_once_fails_on_negative_code() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("c", -9)]);
    let h = harness(three_plugin_root(), executor, clock, 4);
    assert!(!h.scheduler.run_once().await);
}

#[tokio::test]
async fn test_run_once_keeps_manifest_order_within_plugin() {
    let root = TempDir::new().unwrap();
    write_plugin(
        root.path(),
        "alpha",
        json!([job("z-first", "once", false), job("a-second", "hour", false), job("m-third", "day", false)]),
    );
    write_plugin(root.path(), "bravo", json!([job("other", "hour", false)]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, FakeExecutor::default(), clock, 4);

    assert!(h.scheduler.run_once().await);
    assert_eq!(h.executor.calls_for("alpha"), vec!["z-first", "a-second", "m-third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_once_bounded_by_workers() {
    let root = TempDir::new().unwrap();
    for id in ["p1", "p2", "p3", "p4"] {
        write_plugin(root.path(), id, json!([job(&format!("{}-job", id), "hour", false)]));
    }
    let executor = FakeExecutor {
        delay: Duration::from_millis(50),
        ..FakeExecutor::default()
    };
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, executor, clock, 2);

    assert!(h.scheduler.run_once().await);
    assert_eq!(h.executor.calls().len(), 4);
    assert!(h.executor.max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_run_pending_runs_only_due_tasks() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(three_plugin_root(), FakeExecutor::default(), clock, 4);
    h.scheduler.setup().await;

    assert!(h.scheduler.run_pending().await);
    assert!(h.executor.calls().is_empty());

    h.clock.advance(ChronoDuration::minutes(5));
    assert!(h.scheduler.run_pending().await);
    assert_eq!(h.executor.calls(), vec!["c"]);

    h.clock.advance(ChronoDuration::minutes(55));
    assert!(h.scheduler.run_pending().await);
    let mut calls = h.executor.calls();
    calls.sort();
    assert_eq!(calls, vec!["a", "c", "c"]);
}

#[tokio::test]
async fn test_run_pending_reports_failure() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("a", 3)]);
    let h = harness(three_plugin_root(), executor, clock, 4);
    h.scheduler.setup().await;

    h.clock.advance(ChronoDuration::hours(1));
    assert!(!h.scheduler.run_pending().await);
}

#[tokio::test]
async fn test_cron_next_fire_after_completion() {
    let clock = Arc::new(ManualClock::new(start_time()));
    // Each run takes seven minutes of wall time.
    let executor = FakeExecutor {
        clock: Some((clock.clone(), ChronoDuration::minutes(7))),
        ..FakeExecutor::default()
    };
    let root = TempDir::new().unwrap();
    write_plugin(root.path(), "charlie", json!([job("c", "*/5 * * * *", false)]));
    let h = harness(root, executor, clock, 4);
    h.scheduler.setup().await;

    for _ in 0..5 {
        let next_fire = h.scheduler.tasks().await[0].1;
        h.clock.set(next_fire);
        h.scheduler.run_pending().await;

        let completed = h.clock.now();
        let rescheduled = h.scheduler.tasks().await[0].1;
        assert!(rescheduled > completed, "{} <= {}", rescheduled, completed);
    }
    assert_eq!(h.executor.calls().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_single_and_run_pending_are_exclusive() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor {
        delay: Duration::from_millis(40),
        ..FakeExecutor::default()
    };
    let h = harness(three_plugin_root(), executor, clock, 4);
    h.scheduler.setup().await;
    h.clock.advance(ChronoDuration::days(1));

    let scheduler = Arc::new(h.scheduler);
    let mut handles = Vec::new();
    for i in 0..6 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                scheduler.run_single("b").await
            } else {
                scheduler.run_pending().await
            }
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert!(!h.executor.calls().is_empty());
    assert_eq!(h.executor.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_single_unknown_job() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(three_plugin_root(), FakeExecutor::default(), clock, 4);
    h.scheduler.setup().await;
    assert!(!h.scheduler.run_single("nope").await);
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn test_run_single_once_job() {
    let root = TempDir::new().unwrap();
    write_plugin(root.path(), "alpha", json!([job("boot", "once", false)]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("boot", 1)]);
    let h = harness(root, executor, clock, 4);
    h.scheduler.setup().await;

    assert!(h.scheduler.run_single("boot").await);
    assert_eq!(h.executor.calls(), vec!["boot"]);
}

#[tokio::test]
async fn test_changed_reload_job_marks_config_and_cache() {
    let root = TempDir::new().unwrap();
    write_plugin(root.path(), "alpha", json!([job("renew", "day", true)]));
    write_plugin(root.path(), "bravo", json!([job("feed", "day", false)]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let executor = FakeExecutor::with_codes(&[("renew", 1), ("feed", 0)]);
    let h = harness(root, executor, clock, 4);

    assert!(h.scheduler.run_once().await);

    let runs = h.sink.wait_for(2).await;
    let renew = runs.iter().find(|r| r.job_name == "renew").unwrap();
    assert!(renew.success);

    let pending = h.scheduler.take_pending_distribution().unwrap();
    assert!(pending.includes(DistributionKind::Cache));
    assert!(pending.includes(DistributionKind::Config));
    assert!(pending.includes(DistributionKind::Reload));
    assert!(h.scheduler.take_pending_distribution().is_none());
}

#[tokio::test]
async fn test_changed_job_without_reload_marks_cache_only() {
    let root = TempDir::new().unwrap();
    write_plugin(root.path(), "bravo", json!([job("feed", "day", false)]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, FakeExecutor::with_codes(&[("feed", 1)]), clock, 4);

    h.scheduler.run_once().await;

    let pending = h.scheduler.take_pending_distribution().unwrap();
    assert_eq!(pending, Targets::only([DistributionKind::Cache]));
}

#[tokio::test]
async fn test_unchanged_jobs_mark_nothing() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(three_plugin_root(), FakeExecutor::default(), clock, 4);
    h.scheduler.run_once().await;
    assert!(h.scheduler.take_pending_distribution().is_none());
}

#[tokio::test]
async fn test_reload_merges_env_and_runs() {
    let root = three_plugin_root();
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, FakeExecutor::default(), clock, 4);

    let mut env = BTreeMap::new();
    env.insert("A".to_string(), "1".to_string());
    assert!(h.scheduler.reload(env, true).await);

    let mut env = BTreeMap::new();
    env.insert("B".to_string(), "2".to_string());
    assert!(h.scheduler.reload(env, false).await);

    let env = h.scheduler.env();
    assert_eq!(env.get("A").map(String::as_str), Some("1"));
    assert_eq!(env.get("B").map(String::as_str), Some("2"));
    assert_eq!(h.executor.calls().len(), 3);
    assert_eq!(h.scheduler.tasks().await.len(), 3);
}

#[tokio::test]
async fn test_reload_picks_up_new_plugins() {
    let root = TempDir::new().unwrap();
    let root_path = root.path().to_path_buf();
    let clock = Arc::new(ManualClock::new(start_time()));
    let h = harness(root, FakeExecutor::default(), clock, 4);
    h.scheduler.setup().await;
    assert!(h.scheduler.tasks().await.is_empty());

    write_plugin(&root_path, "late", json!([job("late", "hour", false)]));
    h.scheduler.reload(BTreeMap::new(), false).await;

    assert_eq!(h.scheduler.tasks().await.len(), 1);
    assert!(h.scheduler.jobs().contains_key("late"));
}
