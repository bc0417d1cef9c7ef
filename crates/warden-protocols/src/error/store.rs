use thiserror::Error;

/// Failures of a [`FleetStore`](crate::FleetStore) or
/// [`SettingsStore`](crate::SettingsStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No instance registered under this hostname.
    #[error("no instance {0}")]
    NotFound(String),

    /// The backend could not be opened or reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}
