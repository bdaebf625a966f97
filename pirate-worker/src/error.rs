//! Error types for the worker connector

use pirate_protocol::ProtocolError;
use std::fmt::Display;
use thiserror::Error;

/// Connector errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The broker cannot be reached with this transport at all
    #[error("Transport interrupted: {0}")]
    TransportInterrupted(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Message of type {0} could not be processed")]
    UnsupportedOperationType(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

impl ConnectorError {
    /// Wrap a failure raised by a request handler
    pub fn handler(err: impl Display) -> Self {
        ConnectorError::Handler(err.to_string())
    }

    /// Check if this error should stop the connector
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectorError::TransportInterrupted(_))
    }
}

impl From<ProtocolError> for ConnectorError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::SerializationError(_)
            | ProtocolError::DeserializationError(_)
            | ProtocolError::InvalidMessage(_) => ConnectorError::MalformedMessage(err.to_string()),
            other => ConnectorError::TransportInterrupted(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_mapping() {
        assert!(matches!(
            ConnectorError::from(ProtocolError::DeserializationError("eof".into())),
            ConnectorError::MalformedMessage(_)
        ));
        assert!(ConnectorError::from(ProtocolError::NotConnected).is_fatal());
        assert!(!ConnectorError::handler("boom").is_fatal());
    }
}
