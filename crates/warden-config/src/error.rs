use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration file could not be turned into a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("can't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("${{{0}}} is referenced but the variable is not set")]
    UnsetVariable(String),

    #[error("malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
