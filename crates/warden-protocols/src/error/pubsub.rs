//! Pub/sub transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("Pub/sub connection error: {0}")]
    Connection(String),

    #[error("Subscription to {topic} failed: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Pub/sub channel closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_error_display() {
        let err = PubSubError::Subscribe {
            topic: "bw-instances".to_string(),
            message: "refused".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("bw-instances"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_closed_display() {
        assert_eq!(PubSubError::Closed.to_string(), "Pub/sub channel closed");
    }
}
