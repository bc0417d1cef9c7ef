//! Persistence seams: the fleet registry and the settings snapshot.
//!
//! Every caller re-reads through these traits; nothing caches a mutable
//! copy of the membership across calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::instance::{Instance, InstanceMethod, UpsertOutcome};

/// Durable list of known proxy nodes, keyed by hostname.
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// All instances, ordered by hostname.
    async fn get_instances(&self) -> Result<Vec<Instance>, StoreError>;

    /// Insert or overwrite the row for `instance.hostname`.
    async fn upsert_instance(&self, instance: Instance) -> Result<UpsertOutcome, StoreError>;

    /// Record a successful liveness probe.
    async fn seen_instance(&self, hostname: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Replace every instance registered with `method` by `instances`.
    async fn refresh_instances(
        &self,
        method: InstanceMethod,
        instances: Vec<Instance>,
    ) -> Result<(), StoreError>;
}

/// A user-provided configuration snippet distributed to nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConfig {
    /// Snippet type, e.g. `server_http` or `modsec_crs`.
    pub config_type: String,
    /// Owning service, `None` for global snippets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub name: String,
    pub data: String,
}

impl CustomConfig {
    pub fn new(
        config_type: impl Into<String>,
        service_id: Option<String>,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            config_type: config_type.into(),
            service_id,
            name: name.into(),
            data: data.into(),
        }
    }
}

/// An externally installed plugin, stored as a gzip'd tar of its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBundle {
    pub id: String,
    pub data: Bytes,
}

/// Persisted settings snapshot plus the artifacts derived from it.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Flat key→value settings.
    async fn get_settings(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Replace the settings snapshot. Returns whether anything changed.
    async fn save_settings(&self, settings: BTreeMap<String, String>) -> Result<bool, StoreError>;

    async fn get_custom_configs(&self) -> Result<Vec<CustomConfig>, StoreError>;

    async fn save_custom_config(&self, config: CustomConfig) -> Result<(), StoreError>;

    async fn get_plugin_bundles(&self) -> Result<Vec<PluginBundle>, StoreError>;

    async fn save_plugin_bundle(&self, bundle: PluginBundle) -> Result<(), StoreError>;
}
