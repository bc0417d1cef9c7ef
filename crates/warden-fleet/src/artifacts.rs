//! Regenerates the on-disk artifacts distributed to nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use warden_protocols::{CustomConfig, DistributionKind, PluginBundle, Readiness, SettingsStore};

use crate::archive;
use crate::config::ArtifactPaths;
use crate::error::FleetError;
use crate::generator::ConfigGenerator;

const NOT_RELOADING_WAIT: Duration = Duration::from_secs(60);
const SETTINGS_READ_ATTEMPTS: u32 = 5;

/// Builds and packs plugins, custom configs, the generated configuration
/// and the cache tree.
pub struct ArtifactBuilder {
    settings: Arc<dyn SettingsStore>,
    generator: Arc<dyn ConfigGenerator>,
    readiness: Arc<Readiness>,
    paths: ArtifactPaths,
    wait_retry_interval: Duration,
}

impl ArtifactBuilder {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        generator: Arc<dyn ConfigGenerator>,
        readiness: Arc<Readiness>,
        paths: ArtifactPaths,
        wait_retry_interval: Duration,
    ) -> Self {
        Self {
            settings,
            generator,
            readiness,
            paths,
            wait_retry_interval,
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Regenerate the local artifact for `kind`.
    pub async fn prepare(&self, kind: DistributionKind) -> Result<(), FleetError> {
        match kind {
            DistributionKind::Plugins => self.generate_plugins().await,
            DistributionKind::CustomConfigs => self.generate_custom_configs().await,
            DistributionKind::Config => self.generate_config().await.map(|_| ()),
            DistributionKind::Cache | DistributionKind::Reload => Ok(()),
        }
    }

    /// Pack the artifact for `kind`; `None` for kinds without an upload.
    pub async fn pack(&self, kind: DistributionKind) -> Result<Option<Bytes>, FleetError> {
        let (dir, required) = match kind {
            DistributionKind::Plugins => (self.paths.external_plugins_dir.clone(), false),
            DistributionKind::CustomConfigs => (self.paths.custom_configs_dir.clone(), false),
            DistributionKind::Config => (self.paths.config_output_dir.clone(), true),
            DistributionKind::Cache => (self.paths.cache_dir.clone(), false),
            DistributionKind::Reload => return Ok(None),
        };
        let data = blocking(move || {
            if required {
                archive::pack_dir(&dir)
            } else {
                archive::pack_dir_or_empty(&dir)
            }
        })
        .await?;
        Ok(Some(data))
    }

    /// Store every plugin directory under the external plugins directory
    /// that the store does not hold yet, so the next
    /// [`generate_plugins`](Self::generate_plugins) keeps it. Returns the
    /// imported ids.
    pub async fn import_local_plugins(&self) -> Result<Vec<String>, FleetError> {
        let known: BTreeSet<String> = self
            .settings
            .get_plugin_bundles()
            .await?
            .into_iter()
            .map(|bundle| bundle.id)
            .collect();
        let dir = self.paths.external_plugins_dir.clone();
        let bundles = blocking(move || pack_local_plugins(&dir, &known)).await?;

        let mut imported = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let id = bundle.id.clone();
            self.settings.save_plugin_bundle(bundle).await?;
            info!("Imported local plugin {} into the store", id);
            imported.push(id);
        }
        Ok(imported)
    }

    /// Replace the external plugins directory with the stored bundles.
    pub async fn generate_plugins(&self) -> Result<(), FleetError> {
        let bundles = self.settings.get_plugin_bundles().await?;
        let dir = self.paths.external_plugins_dir.clone();
        let count = bundles.len();
        blocking(move || install_plugin_bundles(&dir, &bundles)).await?;
        info!("Installed {} external plugins", count);
        Ok(())
    }

    /// Rewrite the custom config tree from the store.
    pub async fn generate_custom_configs(&self) -> Result<(), FleetError> {
        let configs = self.settings.get_custom_configs().await?;
        let dir = self.paths.custom_configs_dir.clone();
        let count = configs.len();
        blocking(move || write_custom_configs(&dir, &configs)).await?;
        info!("Wrote {} custom configs", count);
        Ok(())
    }

    /// Render the proxy configuration from a fresh settings snapshot.
    ///
    /// Returns whether the generator succeeded.
    pub async fn generate_config(&self) -> Result<bool, FleetError> {
        if !self.readiness.not_reloading.wait_timeout(NOT_RELOADING_WAIT).await {
            warn!("Scheduler still reloading after {:?}, generating anyway", NOT_RELOADING_WAIT);
        }
        let settings = self.read_settings().await?;
        self.generator.generate(&settings).await
    }

    async fn read_settings(&self) -> Result<BTreeMap<String, String>, FleetError> {
        let mut last_error = None;
        for attempt in 1..=SETTINGS_READ_ATTEMPTS {
            match self.settings.get_settings().await {
                Ok(settings) => return Ok(settings),
                Err(e) => {
                    warn!(attempt, "Can't read settings snapshot: {}", e);
                    last_error = Some(e);
                    if attempt < SETTINGS_READ_ATTEMPTS {
                        tokio::time::sleep(self.wait_retry_interval).await;
                    }
                }
            }
        }
        Err(FleetError::SettingsUnavailable(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, FleetError>
where
    F: FnOnce() -> Result<T, FleetError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FleetError::Archive(format!("artifact task failed: {}", e)))?
}

/// Reject names that would escape their parent directory.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Remove every entry of `dir`, creating it if needed.
fn empty_dir(dir: &Path) -> Result<(), FleetError> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Pack each `<dir>/<id>/` holding a `plugin.json` whose id is not in
/// `known`.
fn pack_local_plugins(dir: &Path, known: &BTreeSet<String>) -> Result<Vec<PluginBundle>, FleetError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut plugin_dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.join("plugin.json").is_file() {
            plugin_dirs.push(path);
        }
    }
    plugin_dirs.sort();

    let mut bundles = Vec::new();
    for path in plugin_dirs {
        let Some(id) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if known.contains(id) || !is_safe_component(id) {
            continue;
        }
        match archive::pack_dir(&path) {
            Ok(data) => bundles.push(PluginBundle {
                id: id.to_string(),
                data,
            }),
            Err(e) => warn!("Can't pack local plugin {}: {}", id, e),
        }
    }
    Ok(bundles)
}

fn install_plugin_bundles(dir: &Path, bundles: &[PluginBundle]) -> Result<(), FleetError> {
    empty_dir(dir)?;
    for bundle in bundles {
        if !is_safe_component(&bundle.id) {
            warn!("Ignoring plugin bundle with invalid id {:?}", bundle.id);
            continue;
        }
        let dest = dir.join(&bundle.id);
        if let Err(e) = archive::unpack(&bundle.data, &dest) {
            warn!("Can't install plugin {}: {}", bundle.id, e);
            continue;
        }
        make_jobs_executable(&dest.join("jobs"))?;
        debug!("Installed plugin {} into {}", bundle.id, dest.display());
    }
    Ok(())
}

#[cfg(unix)]
fn make_jobs_executable(jobs_dir: &Path) -> Result<(), FleetError> {
    use std::os::unix::fs::PermissionsExt;

    if !jobs_dir.is_dir() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(jobs_dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let mut permissions = entry.metadata().map_err(std::io::Error::from)?.permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_jobs_executable(_jobs_dir: &Path) -> Result<(), FleetError> {
    Ok(())
}

/// Target file of a custom config, `None` when a component is unsafe.
fn custom_config_path(dir: &Path, config: &CustomConfig) -> Option<PathBuf> {
    let type_dir = config.config_type.replace('_', "-");
    if !is_safe_component(&type_dir) || !is_safe_component(&config.name) {
        return None;
    }
    let mut path = dir.join(type_dir);
    if let Some(service_id) = &config.service_id {
        if !is_safe_component(service_id) {
            return None;
        }
        path.push(service_id);
    }
    path.push(format!("{}.conf", config.name));
    Some(path)
}

fn write_custom_configs(dir: &Path, configs: &[CustomConfig]) -> Result<(), FleetError> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let type_dir = entry?.path();
        if type_dir.is_dir() {
            empty_dir(&type_dir)?;
        }
    }

    for config in configs {
        let Some(path) = custom_config_path(dir, config) else {
            warn!(
                "Ignoring custom config {} of type {} with an invalid path",
                config.name, config.config_type
            );
            continue;
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &config.data)?;
        debug!("Wrote custom config {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
