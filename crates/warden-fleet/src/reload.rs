//! Distribution of artifacts and reload actions to the fleet.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use warden_protocols::{DistributionKind, FleetStore, NodeEndpoint, Targets};

use crate::artifacts::ArtifactBuilder;
use crate::broadcaster::Broadcaster;
use crate::membership::Bootstrapper;

/// Regenerates artifacts and pushes them to nodes.
pub struct ReloadCoordinator {
    fleet: Arc<dyn FleetStore>,
    broadcaster: Broadcaster,
    artifacts: ArtifactBuilder,
}

impl ReloadCoordinator {
    pub fn new(fleet: Arc<dyn FleetStore>, broadcaster: Broadcaster, artifacts: ArtifactBuilder) -> Self {
        Self {
            fleet,
            broadcaster,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &ArtifactBuilder {
        &self.artifacts
    }

    async fn fleet_endpoints(&self) -> Option<Vec<NodeEndpoint>> {
        match self.fleet.get_instances().await {
            Ok(instances) => Some(instances.iter().map(|i| i.endpoint()).collect()),
            Err(e) => {
                error!("Can't read the instance list: {}", e);
                None
            }
        }
    }

    /// Send `targets` to every registered instance, then reload them
    /// unless `no_reload` is set.
    pub async fn send_to_instances(&self, targets: &Targets, no_reload: bool) -> bool {
        let Some(nodes) = self.fleet_endpoints().await else {
            return false;
        };
        self.send_to_nodes(targets, no_reload, &nodes).await
    }

    /// Ping every registered instance first and distribute only to those
    /// that answered.
    pub async fn test_and_send_to_instances(&self, targets: &Targets, no_reload: bool) -> bool {
        let Some(nodes) = self.fleet_endpoints().await else {
            return false;
        };

        let report = self.broadcaster.ping_all(&nodes).await;
        if !report.failed.is_empty() {
            let unreachable: Vec<String> =
                report.failed.iter().map(|(node, _)| node.to_string()).collect();
            warn!(
                "{} of {} instances are unreachable and will not receive {}: {}",
                report.failed.len(),
                nodes.len(),
                targets,
                unreachable.join(", ")
            );
        }
        self.mark_seen(&report.succeeded);

        self.send_to_nodes(targets, no_reload, &report.succeeded).await
    }

    /// Update `last_seen` for `nodes` without waiting.
    fn mark_seen(&self, nodes: &[NodeEndpoint]) {
        let now = Utc::now();
        for node in nodes {
            let fleet = self.fleet.clone();
            let hostname = node.hostname.clone();
            tokio::spawn(async move {
                if let Err(e) = fleet.seen_instance(&hostname, now).await {
                    debug!("Can't update last seen of {}: {}", hostname, e);
                }
            });
        }
    }

    /// Regenerate each requested artifact and upload it to `nodes`, in
    /// send order, then issue the reload action.
    pub async fn send_to_nodes(&self, targets: &Targets, no_reload: bool, nodes: &[NodeEndpoint]) -> bool {
        if targets.is_empty() {
            debug!("Nothing to distribute");
            return true;
        }
        info!("Sending {} to {} instances ...", targets, nodes.len());

        let mut success = true;
        for kind in targets.artifacts() {
            if let Err(e) = self.artifacts.prepare(kind).await {
                error!("Can't generate {}: {}", kind, e);
                success = false;
                if kind == DistributionKind::Config {
                    continue;
                }
            }

            let Some(path) = kind.upload_path() else {
                continue;
            };
            let archive = match self.artifacts.pack(kind).await {
                Ok(Some(archive)) => archive,
                Ok(None) => continue,
                Err(e) => {
                    error!("Can't pack {}, not sending it: {}", kind, e);
                    success = false;
                    continue;
                }
            };

            if nodes.is_empty() {
                continue;
            }
            if !self.broadcaster.upload_all(nodes, path, archive).await.all_succeeded() {
                success = false;
            }
        }

        if !no_reload && !nodes.is_empty() {
            if !self.broadcaster.action_all(nodes, "/reload").await.all_succeeded() {
                error!("Error while reloading instances");
                success = false;
            } else {
                info!("Successfully reloaded {} instances", nodes.len());
            }
        }
        success
    }
}

#[async_trait]
impl Bootstrapper for ReloadCoordinator {
    async fn bootstrap(&self, node: &NodeEndpoint) -> bool {
        info!("Sending full state to new instance {} ...", node);
        let report = self.broadcaster.ping_all(std::slice::from_ref(node)).await;
        if report.succeeded.is_empty() {
            warn!("New instance {} is unreachable, not sending it the full state", node);
            return false;
        }
        self.mark_seen(&report.succeeded);
        self.send_to_nodes(&Targets::All, false, &report.succeeded).await
    }
}

#[cfg(test)]
#[path = "reload_tests.rs"]
mod tests;
