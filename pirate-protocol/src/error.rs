//! Protocol and transport error types

use thiserror::Error;

/// Errors raised while encoding, decoding or moving PPP messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// The peer or the channel went away
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timeout waiting for a message
    #[error("Timeout waiting for message")]
    Timeout,

    /// Frames did not have the expected shape
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Endpoint is already bound by another router
    #[error("Endpoint already in use: {0}")]
    AddressInUse(String),

    /// Transport not connected
    #[error("Transport not connected")]
    NotConnected,
}

impl ProtocolError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::IoError(_) | ProtocolError::Timeout | ProtocolError::ConnectionClosed
        )
    }

    /// Check if the channel that produced this error is no longer usable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed | ProtocolError::NotConnected | ProtocolError::IoError(_)
        )
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
            std::io::ErrorKind::AddrInUse => ProtocolError::AddressInUse(err.to_string()),
            _ => ProtocolError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            ProtocolError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            ProtocolError::DeserializationError(err.to_string())
        } else {
            ProtocolError::SerializationError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(ProtocolError::IoError("network error".to_string()).is_retryable());
        assert!(ProtocolError::Timeout.is_retryable());
        assert!(ProtocolError::ConnectionClosed.is_retryable());
        assert!(!ProtocolError::InvalidMessage("bad format".to_string()).is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(ProtocolError::ConnectionClosed.is_fatal());
        assert!(ProtocolError::NotConnected.is_fatal());
        assert!(!ProtocolError::InvalidMessage("bad format".to_string()).is_fatal());
        assert!(!ProtocolError::Timeout.is_fatal());
    }

    #[test]
    fn test_io_error_mapping() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(ProtocolError::from(eof), ProtocolError::ConnectionClosed));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(ProtocolError::from(other), ProtocolError::IoError(_)));
    }
}
