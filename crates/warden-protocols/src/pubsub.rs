//! Transport-agnostic pub/sub subscription.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PubSubError;

/// Raw payloads received on a topic. The channel closes when the
/// underlying connection is lost.
pub type MessageStream = mpsc::Receiver<String>;

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, PubSubError>;
}
