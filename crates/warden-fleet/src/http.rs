//! HTTP transport for the node control API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HOST;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use warden_protocols::{NodeEndpoint, NodeTransport, TransportError};

use crate::config::HttpTransportConfig;
use crate::error::FleetError;

const USER_AGENT: &str = "warden";
const ARCHIVE_FIELD: &str = "archive.tar.gz";

/// Talks to nodes over plain HTTP.
///
/// Every request carries the node's server name as `Host`, which is how
/// the node routes control traffic to its API.
pub struct HttpTransport {
    ping_client: Client,
    action_client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self, FleetError> {
        let build = |timeout| {
            Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| FleetError::Client(e.to_string()))
        };
        Ok(Self {
            ping_client: build(config.ping_timeout)?,
            action_client: build(config.action_timeout)?,
        })
    }

    fn url(node: &NodeEndpoint, path: &str) -> String {
        format!("{}{}", node.base_url(), path.trim_start_matches('/'))
    }

    async fn send(&self, node: &NodeEndpoint, url: String, request: RequestBuilder) -> Result<(), TransportError> {
        let response = request
            .header(HOST, &node.server_name)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        debug!("{} answered {}", url, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                endpoint: url,
                status: status.as_u16(),
            })
        }
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            endpoint: url.to_string(),
        }
    } else {
        TransportError::Connection {
            endpoint: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl NodeTransport for HttpTransport {
    async fn ping(&self, node: &NodeEndpoint) -> Result<(), TransportError> {
        let url = Self::url(node, "/ping");
        let request = self.ping_client.get(&url);
        self.send(node, url, request).await
    }

    async fn post_action(&self, node: &NodeEndpoint, path: &str) -> Result<(), TransportError> {
        let url = Self::url(node, path);
        let request = self.action_client.post(&url);
        self.send(node, url, request).await
    }

    async fn upload(
        &self,
        node: &NodeEndpoint,
        path: &str,
        archive: Bytes,
    ) -> Result<(), TransportError> {
        let url = Self::url(node, path);
        let part = Part::bytes(archive.to_vec())
            .file_name(ARCHIVE_FIELD)
            .mime_str("application/gzip")
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let form = Form::new().part(ARCHIVE_FIELD, part);
        let request = self.action_client.post(&url).multipart(form);
        self.send(node, url, request).await
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
