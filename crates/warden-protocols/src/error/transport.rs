//! Node transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Endpoint the failed request was aimed at, when known.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            TransportError::Connection { endpoint, .. }
            | TransportError::Timeout { endpoint }
            | TransportError::Status { endpoint, .. } => Some(endpoint),
            TransportError::InvalidRequest(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status {
            endpoint: "http://node-1:5000".to_string(),
            status: 500,
        };
        let display = err.to_string();
        assert!(display.contains("500"));
        assert!(display.contains("node-1"));
    }

    #[test]
    fn test_endpoint_accessor() {
        let err = TransportError::Timeout {
            endpoint: "http://node-2:5000".to_string(),
        };
        assert_eq!(err.endpoint(), Some("http://node-2:5000"));
        assert!(TransportError::InvalidRequest("x".into()).endpoint().is_none());
    }
}
