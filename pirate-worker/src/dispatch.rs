//! Request classification
//!
//! Control requests are recognized by their message name. Everything else
//! is looked up in an [`OperationRegistry`], which decodes the envelope into
//! the handler's operation type.

use pirate_protocol::{Envelope, ProtocolError, TypedMessage};
use std::collections::HashMap;
use std::fmt;

use crate::error::ConnectorError;

pub const CONFIGURATION_REQUEST: &str = "ConfigurationRequest";
pub const START_ALGORITHM_REQUEST: &str = "StartAlgorithmRequest";
pub const STOP_ALGORITHM_REQUEST: &str = "StopAlgorithmRequest";

type Decoder<Op> = Box<dyn Fn(&Envelope) -> Result<Op, ProtocolError> + Send + Sync>;

/// What a decoded request asks the worker to do
#[derive(Debug, PartialEq)]
pub enum Request<Op> {
    Configuration,
    StartAlgorithm,
    StopAlgorithm,
    Operation(Op),
}

/// Maps operation message names to decoders producing `Op`
pub struct OperationRegistry<Op> {
    decoders: HashMap<&'static str, Decoder<Op>>,
}

impl<Op: 'static> OperationRegistry<Op> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Accept messages of type `M`, turning them into operations with `wrap`
    pub fn register<M>(mut self, wrap: fn(M) -> Op) -> Self
    where
        M: TypedMessage + 'static,
    {
        self.decoders.insert(
            M::TYPE_TAG,
            Box::new(move |envelope: &Envelope| envelope.unpack::<M>().map(wrap)),
        );
        self
    }

    pub fn supports(&self, message_name: &str) -> bool {
        self.decoders.contains_key(message_name)
    }

    /// Registered message names, sorted
    pub fn message_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode an operation envelope
    pub fn decode(&self, envelope: &Envelope) -> Result<Op, ConnectorError> {
        let name = envelope.message_name();
        let decoder = self
            .decoders
            .get(name)
            .ok_or_else(|| ConnectorError::UnsupportedOperationType(name.to_string()))?;
        decoder(envelope).map_err(ConnectorError::from)
    }

    /// Sort an incoming envelope into a control request or an operation
    pub fn classify(&self, envelope: &Envelope) -> Result<Request<Op>, ConnectorError> {
        match envelope.message_name() {
            CONFIGURATION_REQUEST => Ok(Request::Configuration),
            START_ALGORITHM_REQUEST => Ok(Request::StartAlgorithm),
            STOP_ALGORITHM_REQUEST => Ok(Request::StopAlgorithm),
            _ => self.decode(envelope).map(Request::Operation),
        }
    }
}

impl<Op: 'static> Default for OperationRegistry<Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Op> fmt::Debug for OperationRegistry<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort_unstable();
        f.debug_struct("OperationRegistry").field("operations", &names).finish()
    }
}
