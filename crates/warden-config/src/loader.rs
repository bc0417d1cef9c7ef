//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"))
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Read {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Substitute every `${VAR}`. An unset variable is an error.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut expanded = String::with_capacity(content.len());
        let mut copied = 0;

        for caps in env_var_pattern().captures_iter(content) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::UnsetVariable(name.as_str().to_string()))?;
            expanded.push_str(&content[copied..whole.start()]);
            expanded.push_str(&value);
            copied = whole.end();
        }
        expanded.push_str(&content[copied..]);

        Ok(expanded)
    }

    /// Expand shell-style paths (e.g., `~/.config`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }

    fn expand_path_buf(path: &mut PathBuf) {
        if let Some(raw) = path.to_str() {
            *path = PathBuf::from(Self::expand_path(raw));
        }
    }

    fn expand_paths(config: &mut Config) {
        for dir in &mut config.scheduler.plugin_dirs {
            Self::expand_path_buf(dir);
        }
        let paths = &mut config.paths;
        Self::expand_path_buf(&mut paths.cache_dir);
        Self::expand_path_buf(&mut paths.external_plugins_dir);
        Self::expand_path_buf(&mut paths.custom_configs_dir);
        Self::expand_path_buf(&mut paths.config_output_dir);
        Self::expand_path_buf(&mut paths.variables_file);
        if let Some(path) = config.store.path.as_mut() {
            Self::expand_path_buf(path);
        }
        if let Some(dir) = config.logging.dir.as_mut() {
            Self::expand_path_buf(dir);
        }
    }
}
