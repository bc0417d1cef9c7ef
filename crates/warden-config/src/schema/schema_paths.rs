//! On-disk artifact locations and the external config generator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directories holding the artifacts pushed to nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Job-produced artifacts.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Unpacked external plugin bundles.
    #[serde(default = "default_external_plugins_dir")]
    pub external_plugins_dir: PathBuf,

    #[serde(default = "default_custom_configs_dir")]
    pub custom_configs_dir: PathBuf,

    /// Generator output.
    #[serde(default = "default_config_output_dir")]
    pub config_output_dir: PathBuf,

    /// `KEY=VALUE` snapshot handed to the generator.
    #[serde(default = "default_variables_file")]
    pub variables_file: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/warden")
}

fn default_external_plugins_dir() -> PathBuf {
    PathBuf::from("/etc/warden/plugins")
}

fn default_custom_configs_dir() -> PathBuf {
    PathBuf::from("/etc/warden/configs")
}

fn default_config_output_dir() -> PathBuf {
    PathBuf::from("/etc/warden/generated")
}

fn default_variables_file() -> PathBuf {
    PathBuf::from("/var/tmp/warden/variables.env")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            external_plugins_dir: default_external_plugins_dir(),
            custom_configs_dir: default_custom_configs_dir(),
            config_output_dir: default_config_output_dir(),
            variables_file: default_variables_file(),
        }
    }
}

/// External proxy-configuration generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Program followed by fixed leading arguments.
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,

    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

fn default_command() -> Vec<String> {
    vec!["/usr/share/warden/gen/main.py".to_string()]
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("/usr/share/warden/settings.json")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("/usr/share/warden/confs")
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            settings_file: default_settings_file(),
            templates_dir: default_templates_dir(),
        }
    }
}
