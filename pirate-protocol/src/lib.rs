//! Paranoid Pirate Protocol building blocks
//!
//! This crate provides the control markers, frame helpers, payload envelopes
//! and addressed transports shared by the broker, its workers and clients.

pub mod client;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod tcp;
pub mod transport;

// Re-export commonly used types
pub use client::BrokerClient;
pub use error::ProtocolError;
pub use memory::{MemoryConnector, MemoryDealer, MemoryHub, MemoryRouter};
pub use protocol::{
    Envelope, Identity, Multipart, Signal, TypedMessage, WorkerConfiguration, EMPTY_TYPE_TAG,
    PPP_HEARTBEAT, PPP_READY,
};
pub use tcp::{TcpConnector, TcpDealer, TcpRouter};
pub use transport::{DealerChannel, DealerConnector, RouterChannel};
