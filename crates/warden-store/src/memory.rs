//! In-process store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use warden_protocols::error::StoreError;
use warden_protocols::{
    CustomConfig, FleetStore, Instance, InstanceMethod, PluginBundle, SettingsStore,
    UpsertOutcome,
};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Store backed by process memory. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    instances: RwLock<BTreeMap<String, Instance>>,
    settings: RwLock<BTreeMap<String, String>>,
    custom_configs: RwLock<Vec<CustomConfig>>,
    plugin_bundles: RwLock<BTreeMap<String, PluginBundle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `instances`.
    pub fn with_instances(instances: Vec<Instance>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.instances.write();
            for instance in instances {
                rows.insert(instance.hostname.clone(), instance);
            }
        }
        store
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn get_instances(&self) -> Result<Vec<Instance>, StoreError> {
        Ok(self.instances.read().values().cloned().collect())
    }

    async fn upsert_instance(&self, instance: Instance) -> Result<UpsertOutcome, StoreError> {
        let mut rows = self.instances.write();
        match rows.get_mut(&instance.hostname) {
            Some(existing) => {
                existing.port = instance.port;
                existing.server_name = instance.server_name;
                existing.method = instance.method;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                rows.insert(instance.hostname.clone(), instance);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn seen_instance(&self, hostname: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.instances.write();
        let instance = rows
            .get_mut(hostname)
            .ok_or_else(|| StoreError::NotFound(hostname.to_string()))?;
        instance.last_seen = Some(at);
        Ok(())
    }

    async fn refresh_instances(
        &self,
        method: InstanceMethod,
        instances: Vec<Instance>,
    ) -> Result<(), StoreError> {
        let mut rows = self.instances.write();
        rows.retain(|_, instance| instance.method != method);
        for instance in instances {
            rows.insert(instance.hostname.clone(), instance);
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.settings.read().clone())
    }

    async fn save_settings(&self, settings: BTreeMap<String, String>) -> Result<bool, StoreError> {
        let mut current = self.settings.write();
        if *current == settings {
            return Ok(false);
        }
        *current = settings;
        Ok(true)
    }

    async fn get_custom_configs(&self) -> Result<Vec<CustomConfig>, StoreError> {
        Ok(self.custom_configs.read().clone())
    }

    async fn save_custom_config(&self, config: CustomConfig) -> Result<(), StoreError> {
        let mut configs = self.custom_configs.write();
        configs.retain(|c| {
            !(c.config_type == config.config_type
                && c.service_id == config.service_id
                && c.name == config.name)
        });
        configs.push(config);
        Ok(())
    }

    async fn get_plugin_bundles(&self) -> Result<Vec<PluginBundle>, StoreError> {
        Ok(self.plugin_bundles.read().values().cloned().collect())
    }

    async fn save_plugin_bundle(&self, bundle: PluginBundle) -> Result<(), StoreError> {
        self.plugin_bundles.write().insert(bundle.id.clone(), bundle);
        Ok(())
    }
}
