//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

mod schema_fleet;
mod schema_paths;

pub use schema_fleet::*;
pub use schema_paths::*;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed for the persisted settings snapshot.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// Control API the coordinator reports to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Kept wider than `u16` so out-of-range values reach the validator.
    #[serde(default = "default_listen_port")]
    pub listen_port: u32,

    /// Overrides the `http://127.0.0.1:<listen_port>` default.
    #[serde(default)]
    pub control_api_url: Option<String>,

    /// Bearer token for the control API.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u32 {
    1337
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            control_api_url: None,
            token: None,
        }
    }
}

impl ServerConfig {
    /// Base URL of the control API, without a trailing slash.
    pub fn control_api(&self) -> String {
        match &self.control_api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://127.0.0.1:{}", self.listen_port),
        }
    }
}

/// Job scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Roots scanned for `*/plugin.json`, in priority order.
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Concurrent plugin workers, defaults to the logical CPU count.
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default = "default_wait_retry_interval")]
    pub wait_retry_interval_secs: f64,

    #[serde(default = "default_pending_interval")]
    pub pending_interval_ms: u64,

    #[serde(default = "default_report_queue_capacity")]
    pub report_queue_capacity: usize,

    #[serde(default = "default_report_max_retries")]
    pub report_max_retries: u32,
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/share/warden/core"),
        PathBuf::from("/etc/warden/plugins"),
    ]
}

fn default_wait_retry_interval() -> f64 {
    5.0
}

fn default_pending_interval() -> u64 {
    1000
}

fn default_report_queue_capacity() -> usize {
    256
}

fn default_report_max_retries() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: default_plugin_dirs(),
            max_workers: None,
            wait_retry_interval_secs: default_wait_retry_interval(),
            pending_interval_ms: default_pending_interval(),
            report_queue_capacity: default_report_queue_capacity(),
            report_max_retries: default_report_max_retries(),
        }
    }
}

impl SchedulerConfig {
    pub fn workers(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn wait_retry_interval(&self) -> Duration {
        Duration::from_secs_f64(self.wait_retry_interval_secs.max(0.0))
    }

    pub fn pending_interval(&self) -> Duration {
        Duration::from_millis(self.pending_interval_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily rotated log files are written here when set.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

/// Fleet registry and settings persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; in-memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
