//! Dynamic membership: nodes announce themselves on a pub/sub topic.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use warden_protocols::{
    FleetStore, Instance, InstanceMethod, NodeEndpoint, Readiness, Subscriber, UpsertOutcome,
};

use crate::config::MembershipConfig;

const MAX_FIELD_LEN: usize = 256;

/// Pushes the complete current state to a node that just joined.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(&self, node: &NodeEndpoint) -> bool;
}

/// A validated `startup` announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub hostname: String,
    pub port: u16,
    pub server_name: String,
}

impl Announcement {
    pub fn into_instance(self) -> Instance {
        Instance::new(self.hostname, self.port, self.server_name, InstanceMethod::Dynamic)
    }
}

/// Why a message was ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("message is not a valid envelope: {0}")]
    Malformed(String),

    #[error("unsupported message type {0:?}")]
    UnsupportedType(String),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

fn string_field(data: &Value, field: &'static str) -> Result<String, RejectReason> {
    let value = data.get(field).ok_or(RejectReason::MissingField(field))?;
    let value = value.as_str().ok_or_else(|| RejectReason::InvalidField {
        field,
        message: "must be a string".to_string(),
    })?;
    if value.is_empty() || value.chars().count() > MAX_FIELD_LEN {
        return Err(RejectReason::InvalidField {
            field,
            message: format!("length must be between 1 and {}", MAX_FIELD_LEN),
        });
    }
    Ok(value.to_string())
}

fn port_field(data: &Value) -> Result<u16, RejectReason> {
    const FIELD: &str = "listening_port";
    let invalid = || RejectReason::InvalidField {
        field: FIELD,
        message: "must be a port between 1 and 65535".to_string(),
    };
    let port = match data.get(FIELD).ok_or(RejectReason::MissingField(FIELD))? {
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        Value::Number(n) => n.as_u64().ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    match u16::try_from(port) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid()),
    }
}

/// Parse and validate one raw payload.
pub fn parse_announcement(payload: &str) -> Result<Announcement, RejectReason> {
    let envelope: Envelope =
        serde_json::from_str(payload).map_err(|e| RejectReason::Malformed(e.to_string()))?;
    if envelope.kind != "startup" {
        return Err(RejectReason::UnsupportedType(envelope.kind));
    }
    let data = envelope.data.ok_or(RejectReason::MissingField("data"))?;
    if !data.is_object() {
        return Err(RejectReason::Malformed("data must be an object".to_string()));
    }

    Ok(Announcement {
        hostname: string_field(&data, "hostname")?,
        port: port_field(&data)?,
        server_name: string_field(&data, "server_name")?,
    })
}

/// Listens for node announcements and keeps the fleet registry current.
pub struct MembershipListener {
    subscriber: Arc<dyn Subscriber>,
    fleet: Arc<dyn FleetStore>,
    bootstrapper: Arc<dyn Bootstrapper>,
    readiness: Arc<Readiness>,
    config: MembershipConfig,
}

impl MembershipListener {
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        fleet: Arc<dyn FleetStore>,
        bootstrapper: Arc<dyn Bootstrapper>,
        readiness: Arc<Readiness>,
        config: MembershipConfig,
    ) -> Self {
        Self {
            subscriber,
            fleet,
            bootstrapper,
            readiness,
            config,
        }
    }

    /// Handle one payload. Returns the upsert outcome for accepted
    /// announcements.
    pub async fn handle_message(&self, payload: &str) -> Option<UpsertOutcome> {
        let announcement = match parse_announcement(payload) {
            Ok(announcement) => announcement,
            Err(e) => {
                warn!("Ignoring membership message: {}", e);
                return None;
            }
        };

        let instance = announcement.into_instance();
        let endpoint = instance.endpoint();
        let outcome = match self.fleet.upsert_instance(instance).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Can't register instance {}: {}", endpoint, e);
                return None;
            }
        };

        match outcome {
            UpsertOutcome::Created => {
                info!("New instance {} registered", endpoint);
                if !self.bootstrapper.bootstrap(&endpoint).await {
                    warn!("Instance {} did not receive the full state", endpoint);
                }
            }
            UpsertOutcome::Updated => {
                debug!("Instance {} updated", endpoint);
            }
        }
        Some(outcome)
    }

    /// Listen until stopping or until subscribing keeps failing.
    pub async fn run(&self) {
        let stopping = self.readiness.stopping.clone();
        let mut failures = 0u32;

        loop {
            if stopping.is_cancelled() {
                break;
            }

            match self.subscriber.subscribe(&self.config.topic).await {
                Ok(mut stream) => {
                    failures = 0;
                    self.readiness.listening_for_dynamic_instances.set();
                    info!("Listening for dynamic instances on {}", self.config.topic);

                    loop {
                        tokio::select! {
                            _ = stopping.cancelled() => return,
                            message = stream.recv() => match message {
                                Some(payload) => {
                                    self.handle_message(&payload).await;
                                }
                                None => {
                                    warn!("Membership subscription on {} lost", self.config.topic);
                                    self.readiness.listening_for_dynamic_instances.clear();
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    if failures >= self.config.max_retries {
                        error!(
                            "Can't subscribe to {} after {} retries, dynamic instances disabled: {}",
                            self.config.topic, failures, e
                        );
                        self.readiness.listening_for_dynamic_instances.clear();
                        return;
                    }
                    failures += 1;
                    warn!(
                        "Can't subscribe to {} (retry {}/{}): {}",
                        self.config.topic, failures, self.config.max_retries, e
                    );
                }
            }

            tokio::select! {
                _ = stopping.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod tests;
