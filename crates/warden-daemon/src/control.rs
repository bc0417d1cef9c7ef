//! Client for the control API readiness probe.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::DaemonError;

/// `GET {endpoint}/ping` against the control API.
#[derive(Clone)]
pub struct ControlApi {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl ControlApi {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, DaemonError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("warden")
            .build()
            .map_err(|e| DaemonError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn ping(&self) -> bool {
        let url = format!("{}/ping", self.endpoint);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Control API answered {} to ping", response.status());
                false
            }
            Err(e) => {
                debug!("Control API not reachable: {}", e);
                false
            }
        }
    }
}
