//! Plugin manifest discovery.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::descriptor::JobDescriptor;
use crate::error::SchedulerError;

/// Validated jobs per plugin id, each list in manifest order.
pub type JobMap = BTreeMap<String, Vec<JobDescriptor>>;

const MANIFEST: &str = "plugin.json";

/// Reads `<root>/*/plugin.json` for every configured root.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    roots: Vec<PathBuf>,
}

impl JobRegistry {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Build a fresh job map. Invalid entries are dropped with one warning
    /// each; nothing here is fatal.
    pub fn load(&self) -> JobMap {
        let mut jobs = JobMap::new();

        for root in &self.roots {
            let manifests = match Self::manifests(root) {
                Ok(manifests) => manifests,
                Err(e) => {
                    warn!("Can't scan plugin directory {:?}: {}", root, e);
                    continue;
                }
            };

            for manifest in manifests {
                let Some(plugin_dir) = manifest.parent() else {
                    continue;
                };
                let Some(plugin_id) = plugin_dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };

                if jobs.contains_key(plugin_id) {
                    warn!(
                        "Plugin {} found again in {:?}, replacing the previous definition",
                        plugin_id, root
                    );
                }

                let plugin_jobs = match Self::load_manifest(plugin_id, plugin_dir, &manifest) {
                    Ok(plugin_jobs) => plugin_jobs,
                    Err(e) => {
                        warn!("Ignoring jobs of plugin {}: {}", plugin_id, e);
                        Vec::new()
                    }
                };
                jobs.insert(plugin_id.to_string(), plugin_jobs);
            }
        }

        debug!(
            "Loaded {} jobs from {} plugins",
            jobs.values().map(Vec::len).sum::<usize>(),
            jobs.len()
        );
        jobs
    }

    fn manifests(root: &Path) -> Result<Vec<PathBuf>, SchedulerError> {
        let pattern = root.join("*").join(MANIFEST);
        let pattern = pattern.to_string_lossy();
        let mut manifests: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
        manifests.sort();
        Ok(manifests)
    }

    fn load_manifest(
        plugin_id: &str,
        plugin_dir: &Path,
        manifest: &Path,
    ) -> Result<Vec<JobDescriptor>, SchedulerError> {
        let content = fs::read_to_string(manifest)?;
        let data: Value =
            serde_json::from_str(&content).map_err(|e| SchedulerError::InvalidManifest {
                path: manifest.display().to_string(),
                message: e.to_string(),
            })?;

        let Some(entries) = data.get("jobs").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut plugin_jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            match JobDescriptor::from_manifest_entry(plugin_id, plugin_dir, entry) {
                Ok(job) => plugin_jobs.push(job),
                Err(e) => warn!("Plugin {}: {}, ignoring job", plugin_id, e),
            }
        }
        Ok(plugin_jobs)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
