//! Proxy node records as held by the fleet registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an instance entered the fleet registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMethod {
    /// Listed in the coordinator configuration.
    Static,
    /// Announced itself over the membership channel.
    Dynamic,
    /// Registered through the control API.
    Api,
    /// Registered through the web UI.
    Ui,
}

impl InstanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceMethod::Static => "static",
            InstanceMethod::Dynamic => "dynamic",
            InstanceMethod::Api => "api",
            InstanceMethod::Ui => "ui",
        }
    }
}

impl std::fmt::Display for InstanceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstanceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(InstanceMethod::Static),
            "dynamic" => Ok(InstanceMethod::Dynamic),
            "api" => Ok(InstanceMethod::Api),
            "ui" => Ok(InstanceMethod::Ui),
            other => Err(format!("unknown instance method: {}", other)),
        }
    }
}

/// A proxy node known to the fleet registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Registry key.
    pub hostname: String,
    /// Port of the node control API.
    pub port: u16,
    /// Value sent as the `Host` header on every control request.
    pub server_name: String,
    pub method: InstanceMethod,
    /// Last successful liveness probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        server_name: impl Into<String>,
        method: InstanceMethod,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            server_name: server_name.into(),
            method,
            last_seen: None,
        }
    }

    /// Address the node control API is reached on.
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            hostname: self.hostname.clone(),
            port: self.port,
            server_name: self.server_name.clone(),
        }
    }
}

/// Addressing information for one node control API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub hostname: String,
    pub port: u16,
    pub server_name: String,
}

impl NodeEndpoint {
    pub fn new(hostname: impl Into<String>, port: u16, server_name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            server_name: server_name.into(),
        }
    }

    /// Base URL with a trailing slash, e.g. `http://node-1:5000/`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.hostname, self.port)
    }
}

impl std::fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Result of an upsert into the fleet registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The hostname was unknown and a new row was written.
    Created,
    /// An existing row was overwritten.
    Updated,
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
