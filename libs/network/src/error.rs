//! Transport Error Types
//!
//! Error handling for connection establishment, framing, handshakes and
//! output buffer exhaustion.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote:?})")]
    Connection {
        message: String,
        remote: Option<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Framing and handshake content errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Peer refused the connection during the handshake
    #[error("Handshake rejected by {remote}: {reason}")]
    Rejected { remote: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Output buffers exhausted for a channel in reject mode, or a blocking wait expired
    #[error("Resource exhausted: {resource}: {message}")]
    ResourceExhausted { resource: String, message: String },

    /// The channel was closed locally or by the peer
    #[error("Channel closed: {reason}")]
    ChannelClosed { reason: String },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            remote: remote.map(str::to_string),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote: Option<&str>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote: remote.map(str::to_string),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a handshake rejection
    pub fn rejected(remote: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a resource exhausted error
    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a channel closed error
    pub fn channel_closed(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: reason.into(),
        }
    }

    /// Check if a reconnect attempt may succeed after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::ResourceExhausted { .. } => true,
            TransportError::ChannelClosed { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Rejected { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::Configuration { .. } => false,
        }
    }

    /// Backpressure from the output buffer pool
    pub fn is_backpressure(&self) -> bool {
        matches!(self, TransportError::ResourceExhausted { .. })
    }

    /// Get error category for logging and channel statistics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Protocol { .. } => "protocol",
            TransportError::Rejected { .. } => "rejected",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::ResourceExhausted { .. } => "resource_exhausted",
            TransportError::ChannelClosed { .. } => "channel_closed",
            TransportError::Io { .. } => "io",
        }
    }
}

// Boxed sources are not cloneable; clones keep the message only
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Network { message, .. } => TransportError::Network {
                message: message.clone(),
                source: None,
            },
            TransportError::Connection {
                message, remote, ..
            } => TransportError::Connection {
                message: message.clone(),
                remote: remote.clone(),
                source: None,
            },
            TransportError::Protocol { message } => TransportError::Protocol {
                message: message.clone(),
            },
            TransportError::Rejected { remote, reason } => TransportError::Rejected {
                remote: remote.clone(),
                reason: reason.clone(),
            },
            TransportError::Configuration { message, field } => TransportError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            TransportError::Timeout {
                operation,
                timeout_ms,
            } => TransportError::Timeout {
                operation: operation.clone(),
                timeout_ms: *timeout_ms,
            },
            TransportError::ResourceExhausted { resource, message } => {
                TransportError::ResourceExhausted {
                    resource: resource.clone(),
                    message: message.clone(),
                }
            }
            TransportError::ChannelClosed { reason } => TransportError::ChannelClosed {
                reason: reason.clone(),
            },
            TransportError::Io { message, source } => TransportError::Io {
                message: message.clone(),
                source: std::io::Error::new(source.kind(), message.as_str()),
            },
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = TransportError::network("Connection refused");
        assert_eq!(err.category(), "network");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_connection_error_keeps_remote() {
        let err = TransportError::connection("Handshake failed", Some("localhost:14002"));
        match err {
            TransportError::Connection { remote, .. } => {
                assert_eq!(remote.as_deref(), Some("localhost:14002"));
            }
            _ => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::timeout("connect", 1000).is_retryable());
        assert!(TransportError::channel_closed("peer").is_retryable());
        assert!(!TransportError::configuration("test", None).is_retryable());
        assert!(!TransportError::protocol("bad frame").is_retryable());
    }

    #[test]
    fn test_backpressure_classification() {
        let err = TransportError::resource_exhausted("output buffers", "0 of 1 free");
        assert!(err.is_backpressure());
        assert_eq!(err.clone().category(), "resource_exhausted");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let transport_err = TransportError::from(io_err);
        match transport_err.clone() {
            TransportError::Io { message, source } => {
                assert!(message.contains("test"));
                assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            _ => panic!("Expected Io error"),
        }
    }
}
