//! Node control API seam and distribution kinds.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::instance::NodeEndpoint;

/// One artifact (or action) pushed to the fleet.
///
/// The declaration order is the order kinds are sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DistributionKind {
    Plugins,
    CustomConfigs,
    Config,
    Cache,
    Reload,
}

impl DistributionKind {
    pub const ALL: [DistributionKind; 5] = [
        DistributionKind::Plugins,
        DistributionKind::CustomConfigs,
        DistributionKind::Config,
        DistributionKind::Cache,
        DistributionKind::Reload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::Plugins => "plugins",
            DistributionKind::CustomConfigs => "custom_configs",
            DistributionKind::Config => "config",
            DistributionKind::Cache => "cache",
            DistributionKind::Reload => "reload",
        }
    }

    /// Node upload endpoint for artifact kinds, `None` for the reload action.
    pub fn upload_path(&self) -> Option<&'static str> {
        match self {
            DistributionKind::Plugins => Some("/plugins"),
            DistributionKind::CustomConfigs => Some("/custom_configs"),
            DistributionKind::Config => Some("/confs"),
            DistributionKind::Cache => Some("/cache"),
            DistributionKind::Reload => None,
        }
    }
}

impl std::fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistributionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistributionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown distribution kind: {}", s))
    }
}

/// Which kinds a distribution covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    All,
    Only(BTreeSet<DistributionKind>),
}

impl Targets {
    pub fn only<I: IntoIterator<Item = DistributionKind>>(kinds: I) -> Self {
        Targets::Only(kinds.into_iter().collect())
    }

    pub fn includes(&self, kind: DistributionKind) -> bool {
        match self {
            Targets::All => true,
            Targets::Only(kinds) => kinds.contains(&kind),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Targets::Only(kinds) if kinds.is_empty())
    }

    /// Artifact kinds to upload, in send order. Never contains `Reload`.
    pub fn artifacts(&self) -> Vec<DistributionKind> {
        DistributionKind::ALL
            .into_iter()
            .filter(|kind| kind.upload_path().is_some() && self.includes(*kind))
            .collect()
    }
}

impl std::fmt::Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Targets::All => f.write_str("all"),
            Targets::Only(kinds) => {
                let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

/// Per-node control API.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// `GET /ping`; `Ok` only on a 200 answer.
    async fn ping(&self, node: &NodeEndpoint) -> Result<(), TransportError>;

    /// `POST` an action such as `/reload` or `/stop`.
    async fn post_action(&self, node: &NodeEndpoint, path: &str) -> Result<(), TransportError>;

    /// Upload a gzip'd tar archive to `path`.
    async fn upload(
        &self,
        node: &NodeEndpoint,
        path: &str,
        archive: Bytes,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
