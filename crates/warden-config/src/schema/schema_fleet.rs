//! Fleet-facing configuration types (node API, membership channel).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Node control API and health sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_healthcheck_interval")]
    pub healthcheck_interval_secs: u64,

    /// Liveness probe timeout.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Timeout for uploads and node actions.
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,

    #[serde(default = "default_api_port")]
    pub default_api_port: u16,

    #[serde(default = "default_server_name")]
    pub default_server_name: String,

    /// Static instances as `hostname[:port][@server_name]`.
    #[serde(default)]
    pub instances: Vec<String>,
}

fn default_healthcheck_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    5
}

fn default_action_timeout() -> u64 {
    10
}

fn default_api_port() -> u16 {
    5000
}

fn default_server_name() -> String {
    "bwapi".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            healthcheck_interval_secs: default_healthcheck_interval(),
            ping_timeout_secs: default_ping_timeout(),
            action_timeout_secs: default_action_timeout(),
            default_api_port: default_api_port(),
            default_server_name: default_server_name(),
            instances: Vec::new(),
        }
    }
}

impl FleetConfig {
    pub fn healthcheck_interval(&self) -> Duration {
        Duration::from_secs(self.healthcheck_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// Redis pub/sub used for dynamic membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u32,

    #[serde(default)]
    pub database: u32,

    #[serde(default)]
    pub ssl: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u32 {
    6379
}

fn default_redis_timeout() -> u64 {
    1000
}

fn default_topic() -> String {
    "bw-instances".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_redis_host(),
            port: default_redis_port(),
            database: 0,
            ssl: false,
            username: None,
            password: None,
            timeout_ms: default_redis_timeout(),
            topic: default_topic(),
        }
    }
}

impl RedisConfig {
    /// Connection URL, e.g. `redis://:pass@host:6379/0`.
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "rediss" } else { "redis" };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme, auth, self.host, self.port, self.database
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
