//! External proxy-configuration generator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::FleetError;

/// Renders the full proxy configuration from a settings snapshot.
#[async_trait]
pub trait ConfigGenerator: Send + Sync {
    /// Returns `Ok(false)` when the generator ran but reported failure.
    async fn generate(&self, settings: &BTreeMap<String, String>) -> Result<bool, FleetError>;
}

/// Runs the generator program as a child process.
pub struct ProcessGenerator {
    /// Program followed by fixed leading arguments.
    pub command: Vec<String>,
    pub settings_file: PathBuf,
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
    pub variables_file: PathBuf,
}

impl ProcessGenerator {
    /// Write the snapshot as `KEY=VALUE` lines.
    pub async fn write_variables(&self, settings: &BTreeMap<String, String>) -> Result<(), FleetError> {
        if let Some(parent) = self.variables_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content: String = settings
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect();
        tokio::fs::write(&self.variables_file, content).await?;
        debug!(
            "Wrote {} variables to {}",
            settings.len(),
            self.variables_file.display()
        );
        Ok(())
    }
}

#[async_trait]
impl ConfigGenerator for ProcessGenerator {
    async fn generate(&self, settings: &BTreeMap<String, String>) -> Result<bool, FleetError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(FleetError::Generator("no generator command configured".to_string()));
        };

        self.write_variables(settings).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        info!("Generating new configuration ...");
        let status = Command::new(program)
            .args(args)
            .arg("--settings")
            .arg(&self.settings_file)
            .arg("--templates")
            .arg(&self.templates_dir)
            .arg("--output")
            .arg(&self.output_dir)
            .arg("--variables")
            .arg(&self.variables_file)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| FleetError::Generator(format!("failed to launch {}: {}", program, e)))?;

        if status.success() {
            info!("Configuration generated in {}", self.output_dir.display());
            Ok(true)
        } else {
            error!(
                "Config generator failed with {}, configuration will not work as expected",
                status
            );
            Ok(false)
        }
    }
}
