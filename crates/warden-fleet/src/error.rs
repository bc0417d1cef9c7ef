//! Fleet-side errors.

use std::path::PathBuf;

use thiserror::Error;
use warden_protocols::{StoreError, TransportError};

#[derive(Debug, Error)]
pub enum FleetError {
    /// Artifact directory that must exist is missing.
    #[error("Artifact directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Archive error: {0}")]
    Archive(String),

    /// The external configuration generator could not be run.
    #[error("Config generator failed: {0}")]
    Generator(String),

    #[error("Settings snapshot unavailable: {0}")]
    SettingsUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
