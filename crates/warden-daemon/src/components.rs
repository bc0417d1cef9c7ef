//! The pluggable parts a [`Coordinator`](crate::Coordinator) is built from.

use std::sync::Arc;

use tracing::info;

use warden_config::Config;
use warden_fleet::{
    ConfigGenerator, HttpTransport, HttpTransportConfig, ProcessGenerator, RedisSubscriber,
};
use warden_protocols::{FleetStore, NodeTransport, SettingsStore, Subscriber};
use warden_scheduler::{
    Clock, HttpReportSink, JobExecutor, ProcessExecutor, ReportSink, ReporterConfig, SystemClock,
};
use warden_store::{MemoryStore, SqliteStore};

use crate::error::DaemonError;

/// Every external seam of the coordinator.
pub struct Components {
    pub fleet: Arc<dyn FleetStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub transport: Arc<dyn NodeTransport>,
    pub executor: Arc<dyn JobExecutor>,
    pub report_sink: Arc<dyn ReportSink>,
    pub generator: Arc<dyn ConfigGenerator>,
    /// `None` disables dynamic membership.
    pub subscriber: Option<Arc<dyn Subscriber>>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// Production components for `config`.
    pub async fn from_config(config: &Config) -> Result<Self, DaemonError> {
        let (fleet, settings): (Arc<dyn FleetStore>, Arc<dyn SettingsStore>) =
            match &config.store.path {
                Some(path) => {
                    info!("Using SQLite store at {}", path.display());
                    let store = Arc::new(SqliteStore::open(path).await?);
                    let fleet: Arc<dyn FleetStore> = store.clone();
                    (fleet, store as Arc<dyn SettingsStore>)
                }
                None => {
                    info!("Using in-memory store");
                    let store = Arc::new(MemoryStore::new());
                    let fleet: Arc<dyn FleetStore> = store.clone();
                    (fleet, store as Arc<dyn SettingsStore>)
                }
            };

        let transport = HttpTransport::new(&HttpTransportConfig {
            ping_timeout: config.fleet.ping_timeout(),
            action_timeout: config.fleet.action_timeout(),
        })?;

        let reporter = ReporterConfig {
            queue_capacity: config.scheduler.report_queue_capacity,
            max_retries: config.scheduler.report_max_retries,
            ..ReporterConfig::new(config.server.control_api())
        }
        .with_token(config.server.token.clone());
        let report_sink = HttpReportSink::new(&reporter)?;

        let generator = ProcessGenerator {
            command: config.generator.command.clone(),
            settings_file: config.generator.settings_file.clone(),
            templates_dir: config.generator.templates_dir.clone(),
            output_dir: config.paths.config_output_dir.clone(),
            variables_file: config.paths.variables_file.clone(),
        };

        let subscriber: Option<Arc<dyn Subscriber>> = if config.redis.enabled {
            Some(Arc::new(RedisSubscriber::new(
                &config.redis.url(),
                config.redis.timeout(),
            )?))
        } else {
            None
        };

        Ok(Self {
            fleet,
            settings,
            transport: Arc::new(transport),
            executor: Arc::new(ProcessExecutor::new()),
            report_sink: Arc::new(report_sink),
            generator: Arc::new(generator),
            subscriber,
            clock: Arc::new(SystemClock),
        })
    }
}
