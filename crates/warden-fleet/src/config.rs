//! Fleet-side settings, filled from the daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Timeouts for the node control transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Liveness probes.
    pub ping_timeout: Duration,
    /// Actions and uploads.
    pub action_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(5),
            action_timeout: Duration::from_secs(10),
        }
    }
}

/// On-disk locations of the distributed artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub external_plugins_dir: PathBuf,
    pub custom_configs_dir: PathBuf,
    pub config_output_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            external_plugins_dir: PathBuf::from("/etc/warden/plugins"),
            custom_configs_dir: PathBuf::from("/etc/warden/configs"),
            config_output_dir: PathBuf::from("/etc/warden/generated"),
            cache_dir: PathBuf::from("/var/cache/warden"),
        }
    }
}

/// Dynamic membership listener settings.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub topic: String,
    /// Pause between re-subscribe attempts.
    pub retry_interval: Duration,
    /// Re-subscribe attempts after a failure before giving up.
    pub max_retries: u32,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            topic: "bw-instances".to_string(),
            retry_interval: Duration::from_secs(5),
            max_retries: 10,
        }
    }
}
