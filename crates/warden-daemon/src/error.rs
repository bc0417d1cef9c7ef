//! Daemon-level errors.

use thiserror::Error;

use warden_config::ConfigError;
use warden_fleet::FleetError;
use warden_protocols::{PubSubError, StoreError};
use warden_scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation found errors; one entry per error.
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Fleet error: {0}")]
    Fleet(#[from] FleetError),

    #[error("Pub/sub error: {0}")]
    PubSub(#[from] PubSubError),

    #[error("HTTP client error: {0}")]
    Client(String),

    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
