//! Pub/sub transports for the membership listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use warden_protocols::{MessageStream, PubSubError, Subscriber};

const CHANNEL_CAPACITY: usize = 64;

/// Redis pub/sub subscription forwarded into an in-process channel.
pub struct RedisSubscriber {
    client: redis::Client,
    timeout: Duration,
}

impl RedisSubscriber {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, PubSubError> {
        let client =
            redis::Client::open(url).map_err(|e| PubSubError::Connection(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, PubSubError> {
        let mut pubsub = tokio::time::timeout(self.timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| PubSubError::Connection("timed out connecting to redis".to_string()))?
            .map_err(|e| PubSubError::Connection(e.to_string()))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| PubSubError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let topic = topic.to_string();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Ignoring undecodable message on {}: {}", topic, e);
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            debug!("Redis subscription on {} ended", topic);
        });
        Ok(rx)
    }
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<(String, mpsc::Sender<String>)>,
    failures_left: u32,
    attempts: u32,
}

/// In-process pub/sub bus.
#[derive(Clone, Default)]
pub struct ChannelSubscriber {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every live subscription on `topic`. Returns the
    /// number of receivers reached.
    pub async fn publish(&self, topic: &str, payload: impl Into<String>) -> usize {
        let payload = payload.into();
        let senders: Vec<mpsc::Sender<String>> = {
            let mut state = self.state.lock();
            state.subscribers.retain(|(_, tx)| !tx.is_closed());
            state
                .subscribers
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, tx)| tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in senders {
            if tx.send(payload.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Close every live subscription.
    pub fn disconnect(&self) {
        self.state.lock().subscribers.clear();
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_left = count;
    }

    /// Number of subscribe calls so far.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, PubSubError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(PubSubError::Connection("channel unavailable".to_string()));
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.subscribers.push((topic.to_string(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_topic_subscribers_only() {
        let bus = ChannelSubscriber::new();
        let mut instances = bus.subscribe("bw-instances").await.unwrap();
        let mut other = bus.subscribe("other").await.unwrap();

        assert_eq!(bus.publish("bw-instances", "hello").await, 1);

        assert_eq!(instances.recv().await.as_deref(), Some("hello"));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_closes_streams() {
        let bus = ChannelSubscriber::new();
        let mut stream = bus.subscribe("bw-instances").await.unwrap();
        bus.disconnect();
        assert!(stream.recv().await.is_none());
        assert_eq!(bus.publish("bw-instances", "late").await, 0);
    }

    #[tokio::test]
    async fn test_fail_next() {
        let bus = ChannelSubscriber::new();
        bus.fail_next(2);
        assert!(bus.subscribe("t").await.is_err());
        assert!(bus.subscribe("t").await.is_err());
        assert!(bus.subscribe("t").await.is_ok());
        assert_eq!(bus.attempts(), 3);
    }

    #[test]
    fn test_redis_subscriber_rejects_bad_url() {
        assert!(RedisSubscriber::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_redis_subscribe_unreachable() {
        let subscriber =
            RedisSubscriber::new("redis://127.0.0.1:1/0", Duration::from_millis(500)).unwrap();
        let err = subscriber.subscribe("bw-instances").await.unwrap_err();
        assert!(matches!(err, PubSubError::Connection(_)));
    }
}
