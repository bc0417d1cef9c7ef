//! Schedule engine and run coordinator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use warden_protocols::{DistributionKind, Targets};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::descriptor::JobDescriptor;
use crate::executor::{JobExecutor, JobOutcome};
use crate::registry::{JobMap, JobRegistry};
use crate::reporter::{JobRun, RunReporter};
use crate::task::Task;

/// Executes single jobs and records their follow-up needs.
struct JobRunner {
    executor: Arc<dyn JobExecutor>,
    reporter: RunReporter,
    clock: Arc<dyn Clock>,
    env: RwLock<BTreeMap<String, String>>,
    pending: SyncMutex<BTreeSet<DistributionKind>>,
}

impl JobRunner {
    async fn run(&self, job: &JobDescriptor) -> JobOutcome {
        info!("Executing job {} from plugin {} ...", job.name, job.plugin_id);
        let env = self.env.read().clone();

        let start_date = self.clock.now();
        let code = match self.executor.execute(job, &env).await {
            Ok(code) => code,
            Err(e) => {
                error!(
                    "Exception while executing job {} from plugin {}: {}",
                    job.name, job.plugin_id, e
                );
                -1
            }
        };
        let end_date = self.clock.now();

        let outcome = JobOutcome::from_code(code);
        match outcome {
            JobOutcome::NoChange => {
                debug!("Job {} from plugin {} reported no change", job.name, job.plugin_id);
            }
            JobOutcome::Changed => {
                info!(
                    "Job {} from plugin {} changed artifacts",
                    job.name, job.plugin_id
                );
                let mut pending = self.pending.lock();
                pending.insert(DistributionKind::Cache);
                if job.reload {
                    pending.insert(DistributionKind::Config);
                    pending.insert(DistributionKind::Reload);
                }
            }
            JobOutcome::Failed(code) => {
                error!(
                    "Error while executing job {} from plugin {} (exit code {})",
                    job.name, job.plugin_id, code
                );
            }
        }

        self.reporter.report(JobRun {
            job_name: job.name.clone(),
            success: outcome.is_success(),
            start_date,
            end_date,
        });

        outcome
    }
}

/// Owns the job snapshot and the scheduled task list.
///
/// `run_pending` and `run_single` hold the task lock for their whole
/// execution and therefore never overlap.
pub struct Scheduler {
    registry: JobRegistry,
    runner: Arc<JobRunner>,
    clock: Arc<dyn Clock>,
    jobs: RwLock<Arc<JobMap>>,
    tasks: Mutex<Vec<Task>>,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn JobExecutor>,
        reporter: RunReporter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = JobRegistry::new(config.plugin_dirs);
        let jobs = Arc::new(registry.load());
        let runner = Arc::new(JobRunner {
            executor,
            reporter,
            clock: clock.clone(),
            env: RwLock::new(BTreeMap::new()),
            pending: SyncMutex::new(BTreeSet::new()),
        });

        Self {
            registry,
            runner,
            clock,
            jobs: RwLock::new(jobs),
            tasks: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
        }
    }

    /// Current job snapshot.
    pub fn jobs(&self) -> Arc<JobMap> {
        self.jobs.read().clone()
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        self.runner.env.read().clone()
    }

    /// Merge `env` into the execution environment.
    pub fn update_env(&self, env: BTreeMap<String, String>) {
        self.runner.env.write().extend(env);
    }

    /// Scheduled tasks as `(job name, next fire time)`.
    pub async fn tasks(&self) -> Vec<(String, chrono::DateTime<chrono::Utc>)> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|t| (t.descriptor.name.clone(), t.next_fire))
            .collect()
    }

    /// Re-read every plugin manifest.
    pub fn load_jobs(&self) {
        *self.jobs.write() = Arc::new(self.registry.load());
    }

    /// Rebuild the task list from the current job snapshot.
    pub async fn setup(&self) {
        let jobs = self.jobs();
        let now = self.clock.now();
        let mut tasks = self.tasks.lock().await;
        tasks.clear();

        for job in jobs.values().flatten() {
            if job.every.is_once() {
                continue;
            }
            match Task::schedule(job.clone(), now) {
                Some(task) => {
                    debug!(
                        "Scheduled job {} from plugin {} ({}), next run at {}",
                        job.name, job.plugin_id, job.every, task.next_fire
                    );
                    tasks.push(task);
                }
                None => warn!(
                    "Job {} from plugin {} has no upcoming run for '{}', not scheduled",
                    job.name, job.plugin_id, job.every
                ),
            }
        }
        info!("{} jobs scheduled", tasks.len());
    }

    pub async fn clear(&self) {
        self.tasks.lock().await.clear();
    }

    /// Merge `env`, rebuild everything and optionally run every job once
    /// before the periodic schedule resumes.
    pub async fn reload(&self, env: BTreeMap<String, String>, run: bool) -> bool {
        self.update_env(env);
        self.clear().await;
        self.load_jobs();
        let success = if run { self.run_once().await } else { true };
        self.setup().await;
        success
    }

    /// Run every job once: one worker per plugin, jobs in manifest order,
    /// workers bounded by the semaphore.
    pub async fn run_once(&self) -> bool {
        let jobs = self.jobs();
        let mut workers = JoinSet::new();

        for (plugin_id, plugin_jobs) in jobs.iter() {
            if plugin_jobs.is_empty() {
                continue;
            }
            let plugin_id = plugin_id.clone();
            let plugin_jobs = plugin_jobs.clone();
            let runner = self.runner.clone();
            let semaphore = self.semaphore.clone();

            workers.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!("Worker semaphore closed, running plugin {} unbounded", plugin_id);
                        None
                    }
                };
                let mut success = true;
                for job in &plugin_jobs {
                    if !runner.run(job).await.is_success() {
                        success = false;
                    }
                }
                success
            });
        }

        let mut success = true;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_success) => success &= worker_success,
                Err(e) => {
                    error!("Plugin worker crashed: {}", e);
                    success = false;
                }
            }
        }
        success
    }

    /// Run every due task and reschedule it past its completion time.
    pub async fn run_pending(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        let mut success = true;
        let mut expired = Vec::new();

        for (index, task) in tasks.iter_mut().enumerate() {
            if !task.is_due(self.clock.now()) {
                continue;
            }
            info!(
                "Job {} from plugin {} should run, executing it ...",
                task.descriptor.name, task.descriptor.plugin_id
            );
            if !self.runner.run(&task.descriptor).await.is_success() {
                success = false;
            }
            if !task.reschedule(self.clock.now()) {
                expired.push(index);
            }
        }

        for index in expired.into_iter().rev() {
            let task = tasks.remove(index);
            warn!(
                "Job {} has no further runs for '{}', removed from schedule",
                task.descriptor.name, task.descriptor.every
            );
        }
        success
    }

    /// Run the job named `job_name` now, under the task lock.
    ///
    /// Falls back to the job snapshot for `once` jobs, which have no task.
    /// Returns `false` when no such job exists.
    pub async fn run_single(&self, job_name: &str) -> bool {
        let mut tasks = self.tasks.lock().await;

        if let Some(task) = tasks.iter_mut().find(|t| t.descriptor.name == job_name) {
            info!(
                "Running job {} from plugin {} ...",
                task.descriptor.name, task.descriptor.plugin_id
            );
            let success = self.runner.run(&task.descriptor).await.is_success();
            task.reschedule(self.clock.now());
            return success;
        }

        let jobs = self.jobs();
        let Some(job) = jobs.values().flatten().find(|j| j.name == job_name) else {
            warn!("Job {} not found, nothing to run", job_name);
            return false;
        };
        info!("Running job {} from plugin {} ...", job.name, job.plugin_id);
        self.runner.run(job).await.is_success()
    }

    /// Kinds marked for distribution by changed jobs since the last call.
    pub fn take_pending_distribution(&self) -> Option<Targets> {
        let kinds = std::mem::take(&mut *self.runner.pending.lock());
        (!kinds.is_empty()).then_some(Targets::Only(kinds))
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
