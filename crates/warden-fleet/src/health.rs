//! Periodic liveness sweep over the fleet.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use warden_protocols::{FleetStore, NodeTransport};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub alive: usize,
    pub unreachable: usize,
}

/// Probes every registered instance and records who answered.
pub struct HealthMonitor {
    fleet: Arc<dyn FleetStore>,
    transport: Arc<dyn NodeTransport>,
}

impl HealthMonitor {
    pub fn new(fleet: Arc<dyn FleetStore>, transport: Arc<dyn NodeTransport>) -> Self {
        Self { fleet, transport }
    }

    /// Ping every instance concurrently. `last_seen` is updated in the
    /// background for each node that answered.
    pub async fn sweep(&self) -> SweepReport {
        let instances = match self.fleet.get_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                error!("Health check skipped, can't read the instance list: {}", e);
                return SweepReport::default();
            }
        };
        if instances.is_empty() {
            debug!("No instances to check");
            return SweepReport::default();
        }

        let results = join_all(instances.iter().map(|instance| async move {
            let endpoint = instance.endpoint();
            (instance, self.transport.ping(&endpoint).await)
        }))
        .await;

        let mut report = SweepReport::default();
        for (instance, result) in results {
            match result {
                Ok(()) => {
                    report.alive += 1;
                    let fleet = self.fleet.clone();
                    let hostname = instance.hostname.clone();
                    let now = Utc::now();
                    tokio::spawn(async move {
                        if let Err(e) = fleet.seen_instance(&hostname, now).await {
                            warn!("Can't update last seen of instance {}: {}", hostname, e);
                        }
                    });
                }
                Err(e) => {
                    report.unreachable += 1;
                    warn!(instance = %instance.hostname, "Health check failed: {}", e);
                }
            }
        }

        info!(
            "Health check done: {} alive, {} unreachable",
            report.alive, report.unreachable
        );
        report
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
