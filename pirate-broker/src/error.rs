//! Error types for the broker

use pirate_protocol::ProtocolError;
use thiserror::Error;

/// Broker errors
///
/// Only [`BrokerError::TransportInterrupted`] ends the broker loop; every
/// other variant is logged and the offending message dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Transport interrupted: {0}")]
    TransportInterrupted(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unrecognized worker identity: {0}")]
    UnrecognizedWorkerIdentity(String),

    #[error("No worker available")]
    NoWorkerAvailable,

    #[error("No worker available for language {0}")]
    NoWorkerForLanguage(i64),

    #[error("No configuration worker available")]
    NoConfigWorker,
}

impl BrokerError {
    /// Check if this error should stop the broker
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::TransportInterrupted(_))
    }
}

impl From<ProtocolError> for BrokerError {
    fn from(err: ProtocolError) -> Self {
        if err.is_fatal() {
            BrokerError::TransportInterrupted(err.to_string())
        } else {
            BrokerError::MalformedMessage(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_classification() {
        assert!(BrokerError::from(ProtocolError::ConnectionClosed).is_fatal());
        assert!(!BrokerError::from(ProtocolError::InvalidMessage("x".into())).is_fatal());
        assert!(!BrokerError::NoWorkerForLanguage(3).is_fatal());
        assert_eq!(
            BrokerError::NoWorkerForLanguage(3).to_string(),
            "No worker available for language 3"
        );
    }
}
