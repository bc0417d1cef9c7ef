//! Scheduler and reporter configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Plugin roots, scanned in order. Later roots win on id clashes.
    pub plugin_dirs: Vec<PathBuf>,
    /// Concurrent plugin workers during `run_once`.
    pub max_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: Vec::new(),
            max_workers: num_cpus::get().max(1),
        }
    }
}

/// Run-status reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Control API base URL without trailing slash.
    pub endpoint: String,
    pub token: Option<String>,
    pub queue_capacity: usize,
    /// Backpressure retries per report before it is dropped.
    pub max_retries: u32,
    pub timeout: Duration,
}

impl ReporterConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            queue_capacity: 256,
            max_retries: 10,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }
}
