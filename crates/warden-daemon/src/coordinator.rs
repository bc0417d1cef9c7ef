//! The coordinator context: one value owning every component.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use warden_config::{parse_static_instances, Config, ConfigValidator};
use warden_fleet::{
    ArtifactBuilder, ArtifactPaths, Broadcaster, HealthMonitor, MembershipConfig,
    MembershipListener, ReloadCoordinator,
};
use warden_protocols::{
    DistributionKind, FleetStore, InstanceMethod, Readiness, SettingsStore, Targets,
};
use warden_scheduler::{RunReporter, Scheduler, SchedulerConfig};

use crate::components::Components;
use crate::control::ControlApi;
use crate::error::DaemonError;
use crate::signal::{DaemonSignal, SignalHandler};
use crate::supervisor::{run_repeatedly, TaskSupervisor};

const RELOAD_WAIT: Duration = Duration::from_secs(60);
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(3);
const REPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const MEMBERSHIP_MAX_RETRIES: u32 = 10;

/// Owns the scheduler, the fleet components and the readiness flags, and
/// supervises the long-lived loops.
///
/// Must be created inside a tokio runtime.
pub struct Coordinator {
    config: Config,
    readiness: Arc<Readiness>,
    fleet: Arc<dyn FleetStore>,
    settings: Arc<dyn SettingsStore>,
    scheduler: Arc<Scheduler>,
    reload: Arc<ReloadCoordinator>,
    health: Arc<HealthMonitor>,
    membership: Option<Arc<MembershipListener>>,
    control: ControlApi,
    supervisor: Mutex<TaskSupervisor>,
    reporter: RunReporter,
    reporter_task: Mutex<Option<JoinHandle<()>>>,
}

/// Variables every job sees besides the settings snapshot.
fn base_env(config: &Config) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("API_ADDR".to_string(), config.server.control_api());
    if let Some(token) = config.server.token.as_ref().filter(|t| !t.is_empty()) {
        env.insert("CORE_TOKEN".to_string(), token.clone());
    }
    env
}

impl Coordinator {
    /// Validate `config` and wire `components` together.
    pub fn new(config: Config, components: Components) -> Result<Self, DaemonError> {
        let validation = ConfigValidator::validate(&config);
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        if !validation.is_valid() {
            return Err(DaemonError::InvalidConfig(
                validation.errors.iter().map(|e| e.to_string()).collect(),
            ));
        }

        let readiness = Arc::new(Readiness::new());

        let (reporter, reporter_task) = RunReporter::spawn(
            components.report_sink,
            config.scheduler.report_queue_capacity,
            config.scheduler.report_max_retries,
        );
        let scheduler = Scheduler::new(
            SchedulerConfig {
                plugin_dirs: config.scheduler.plugin_dirs.clone(),
                max_workers: config.scheduler.workers(),
            },
            components.executor,
            reporter.clone(),
            components.clock,
        );
        scheduler.update_env(base_env(&config));

        let artifacts = ArtifactBuilder::new(
            components.settings.clone(),
            components.generator,
            readiness.clone(),
            ArtifactPaths {
                external_plugins_dir: config.paths.external_plugins_dir.clone(),
                custom_configs_dir: config.paths.custom_configs_dir.clone(),
                config_output_dir: config.paths.config_output_dir.clone(),
                cache_dir: config.paths.cache_dir.clone(),
            },
            config.scheduler.wait_retry_interval(),
        );
        let reload = Arc::new(ReloadCoordinator::new(
            components.fleet.clone(),
            Broadcaster::new(components.transport.clone()),
            artifacts,
        ));
        let health = Arc::new(HealthMonitor::new(
            components.fleet.clone(),
            components.transport,
        ));

        let membership = components.subscriber.map(|subscriber| {
            Arc::new(MembershipListener::new(
                subscriber,
                components.fleet.clone(),
                reload.clone(),
                readiness.clone(),
                MembershipConfig {
                    topic: config.redis.topic.clone(),
                    retry_interval: config.scheduler.wait_retry_interval(),
                    max_retries: MEMBERSHIP_MAX_RETRIES,
                },
            ))
        });

        let control = ControlApi::new(
            &config.server.control_api(),
            config.server.token.clone(),
            config.fleet.ping_timeout(),
        )?;

        Ok(Self {
            config,
            readiness,
            fleet: components.fleet,
            settings: components.settings,
            scheduler: Arc::new(scheduler),
            reload,
            health,
            membership,
            control,
            supervisor: Mutex::new(TaskSupervisor::new()),
            reporter,
            reporter_task: Mutex::new(Some(reporter_task)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn reload_coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.reload
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Merge the configured `[settings]` into the persisted snapshot.
    /// Returns whether the snapshot changed.
    pub async fn seed_settings(&self) -> Result<bool, DaemonError> {
        if self.config.settings.is_empty() {
            return Ok(false);
        }
        let mut settings = self.settings.get_settings().await?;
        settings.extend(self.config.settings.clone());
        let changed = self.settings.save_settings(settings).await?;
        if changed {
            info!("Settings snapshot updated from the configuration file");
        }
        Ok(changed)
    }

    /// Forget dynamic instances and replace static ones with the
    /// configured list.
    pub async fn refresh_instances(&self) -> Result<(), DaemonError> {
        self.fleet
            .refresh_instances(InstanceMethod::Dynamic, Vec::new())
            .await?;
        self.refresh_static_instances().await
    }

    /// Replace static instances with the configured list. Dynamic rows
    /// belong to a running daemon and are left alone.
    pub async fn refresh_static_instances(&self) -> Result<(), DaemonError> {
        let parsed = parse_static_instances(&self.config.fleet);
        let count = parsed.instances.len();
        self.fleet
            .refresh_instances(InstanceMethod::Static, parsed.instances)
            .await?;
        info!("{} static instances registered", count);
        Ok(())
    }

    /// Seed state and spawn every long-lived task.
    pub async fn start(self: &Arc<Self>) -> Result<(), DaemonError> {
        self.seed_settings().await?;
        self.refresh_instances().await?;
        self.reload.artifacts().import_local_plugins().await?;

        let mut supervisor = self.supervisor.lock().await;

        let this = self.clone();
        supervisor.spawn("startup", async move {
            let targets = Targets::only([
                DistributionKind::Plugins,
                DistributionKind::CustomConfigs,
                DistributionKind::Config,
            ]);
            if !this.reload.test_and_send_to_instances(&targets, true).await {
                warn!("Initial distribution did not reach every instance");
            }
            this.run_jobs().await;
        });

        let this = self.clone();
        let interval = self.config.scheduler.pending_interval();
        let stopping = self.readiness.stopping.clone();
        supervisor.spawn("pending-jobs", async move {
            run_repeatedly("pending-jobs", interval, false, stopping, move || {
                let this = this.clone();
                async move { this.drive_pending().await }
            })
            .await;
        });

        let health = self.health.clone();
        let interval = self.config.fleet.healthcheck_interval();
        let stopping = self.readiness.stopping.clone();
        supervisor.spawn("healthcheck", async move {
            run_repeatedly("healthcheck", interval, true, stopping, move || {
                let health = health.clone();
                async move {
                    health.sweep().await;
                }
            })
            .await;
        });

        if let Some(listener) = &self.membership {
            let listener = listener.clone();
            supervisor.spawn("membership", async move { listener.run().await });
        }

        info!("Coordinator started with {} tasks", supervisor.len());
        Ok(())
    }

    /// Wait until the control API answers once. `false` when stopping
    /// first.
    async fn wait_for_control_api(&self) -> bool {
        if self.readiness.api_reachable.is_set() {
            return true;
        }
        let retry = self.config.scheduler.wait_retry_interval();
        loop {
            if self.readiness.is_stopping() {
                return false;
            }
            if self.control.ping().await {
                self.readiness.api_reachable.set();
                return true;
            }
            warn!(
                "Control API {} is not reachable yet, retrying in {:?} ...",
                self.control.endpoint(),
                retry
            );
            tokio::select! {
                _ = self.readiness.stopping.cancelled() => return false,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }

    /// Mark a reload as running and read the settings snapshot.
    async fn begin_reload(&self) -> Option<BTreeMap<String, String>> {
        if !self.readiness.not_reloading.take_timeout(RELOAD_WAIT).await {
            warn!(
                "Previous reload still running after {:?}, reloading anyway",
                RELOAD_WAIT
            );
            self.readiness.not_reloading.clear();
        }
        match self.settings.get_settings().await {
            Ok(settings) => Some(settings),
            Err(e) => {
                error!("Can't read the settings snapshot, scheduler not reloaded: {}", e);
                self.readiness.not_reloading.set();
                None
            }
        }
    }

    /// Rebuild the scheduler from fresh settings, run every job once and
    /// distribute the results.
    pub async fn run_jobs(&self) -> bool {
        if !self.wait_for_control_api().await {
            return false;
        }
        let Some(env) = self.begin_reload().await else {
            return false;
        };

        let success = self.scheduler.reload(env, true).await;
        self.readiness.not_reloading.set();
        if success {
            info!("All jobs in run_once() were successful");
        } else {
            error!("At least one job in run_once() failed");
        }

        // The full cache and config send below covers every change.
        let _ = self.scheduler.take_pending_distribution();
        let targets = Targets::only([DistributionKind::Cache, DistributionKind::Config]);
        if !self.reload.test_and_send_to_instances(&targets, false).await {
            warn!("Not every instance received the new configuration");
        }

        self.readiness.scheduler_initialized.set();
        success
    }

    /// Rebuild the scheduler without running it, then run one job.
    pub async fn run_job(&self, job_name: &str) -> bool {
        if !self.wait_for_control_api().await {
            return false;
        }
        let Some(env) = self.begin_reload().await else {
            return false;
        };

        self.scheduler.reload(env, false).await;
        self.readiness.not_reloading.set();

        let success = self.scheduler.run_single(job_name).await;
        self.distribute_pending().await;
        success
    }

    /// One tick of the pending-job driver.
    async fn drive_pending(&self) {
        if !self.readiness.scheduler_initialized.is_set() {
            return;
        }
        if !self.scheduler.run_pending().await {
            error!("At least one job in run_pending() failed");
        }
        self.distribute_pending().await;
    }

    async fn distribute_pending(&self) {
        let Some(targets) = self.scheduler.take_pending_distribution() else {
            return;
        };
        let no_reload = !targets.includes(DistributionKind::Reload);
        if !self.reload.test_and_send_to_instances(&targets, no_reload).await {
            warn!("Not every instance received {}", targets);
        }
    }

    /// Start, then handle signals until asked to stop.
    pub async fn serve(self: Arc<Self>, signals: &SignalHandler) -> Result<(), DaemonError> {
        let mut rx = signals.subscribe();
        self.start().await?;

        loop {
            match rx.recv().await {
                Ok(DaemonSignal::Shutdown) => {
                    info!("Received shutdown signal");
                    break;
                }
                Ok(DaemonSignal::Reload) => {
                    info!("Received reload signal, rebuilding the scheduler");
                    let this = self.clone();
                    self.supervisor.lock().await.spawn("reload", async move {
                        this.run_jobs().await;
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} signals", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Set the stop flag and join every task.
    pub async fn shutdown(&self) {
        info!("Stopping coordinator ...");
        self.readiness.request_stop();

        let stuck = self.supervisor.lock().await.join_all(TASK_JOIN_TIMEOUT).await;
        if !stuck.is_empty() {
            warn!("Tasks aborted at shutdown: {}", stuck.join(", "));
        }
        if !self.reporter.drain(REPORT_DRAIN_TIMEOUT).await {
            warn!(
                "Dropping {} undelivered run reports",
                self.reporter.pending()
            );
        }
        if let Some(reporter) = self.reporter_task.lock().await.take() {
            reporter.abort();
        }
        info!("Coordinator stopped");
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
