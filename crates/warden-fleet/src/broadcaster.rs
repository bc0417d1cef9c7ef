//! Concurrent fan-out of one request to many nodes.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{info, warn};

use warden_protocols::{NodeEndpoint, NodeTransport, TransportError};

/// Per-node results of one fan-out.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub succeeded: Vec<NodeEndpoint>,
    pub failed: Vec<(NodeEndpoint, TransportError)>,
}

impl BroadcastReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    fn collect(results: Vec<(NodeEndpoint, Result<(), TransportError>)>) -> Self {
        let mut report = Self::default();
        for (node, result) in results {
            match result {
                Ok(()) => report.succeeded.push(node),
                Err(e) => report.failed.push((node, e)),
            }
        }
        report
    }
}

/// Sends the same request to every node at once.
///
/// A failing node is logged and recorded; it never stops delivery to the
/// others.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Arc<dyn NodeTransport>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn NodeTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn NodeTransport> {
        &self.transport
    }

    pub async fn ping_all(&self, nodes: &[NodeEndpoint]) -> BroadcastReport {
        let results = join_all(nodes.iter().map(|node| async move {
            (node.clone(), self.transport.ping(node).await)
        }))
        .await;
        let report = BroadcastReport::collect(results);
        for (node, e) in &report.failed {
            info!("Can't reach instance {}: {}", node, e);
        }
        report
    }

    pub async fn action_all(&self, nodes: &[NodeEndpoint], path: &str) -> BroadcastReport {
        let results = join_all(nodes.iter().map(|node| async move {
            (node.clone(), self.transport.post_action(node, path).await)
        }))
        .await;
        self.summarize(results, path)
    }

    pub async fn upload_all(
        &self,
        nodes: &[NodeEndpoint],
        path: &str,
        archive: Bytes,
    ) -> BroadcastReport {
        let results = join_all(nodes.iter().map(|node| {
            let archive = archive.clone();
            async move { (node.clone(), self.transport.upload(node, path, archive).await) }
        }))
        .await;
        self.summarize(results, path)
    }

    fn summarize(
        &self,
        results: Vec<(NodeEndpoint, Result<(), TransportError>)>,
        path: &str,
    ) -> BroadcastReport {
        let report = BroadcastReport::collect(results);
        for (node, e) in &report.failed {
            warn!("Request {} to instance {} failed: {}", path, node, e);
        }
        if report.all_succeeded() {
            info!("Successfully sent {} to {} instances", path, report.succeeded.len());
        } else {
            warn!(
                "Not all instances received {} ({} succeeded, {} failed)",
                path,
                report.succeeded.len(),
                report.failed.len()
            );
        }
        report
    }
}

#[cfg(test)]
#[path = "broadcaster_tests.rs"]
mod tests;
