//! Addressed transport abstractions
//!
//! A router is the bound side of a channel: every inbound message starts with
//! the sender's identity frame and every outbound message starts with the
//! destination identity frame. A dealer is the connecting side and exchanges
//! plain multipart messages with exactly one router.

use async_trait::async_trait;

use crate::error::ProtocolError;
use crate::protocol::{Identity, Multipart};

/// Bound, identity-routing end of a channel
#[async_trait]
pub trait RouterChannel: Send {
    /// Wait for the next message. The first frame is the sender identity.
    ///
    /// Must be cancel safe: dropping the future loses no message.
    async fn recv(&mut self) -> Result<Multipart, ProtocolError>;

    /// Take a message if one is already queued
    fn try_recv(&mut self) -> Result<Option<Multipart>, ProtocolError>;

    /// Send a message whose first frame names the destination peer.
    /// Messages for unknown peers are dropped.
    async fn send(&mut self, message: Multipart) -> Result<(), ProtocolError>;
}

/// Connecting end of a channel
#[async_trait]
pub trait DealerChannel: Send {
    /// Identity this dealer announced to the router
    fn identity(&self) -> &Identity;

    /// Wait for the next message. Must be cancel safe.
    async fn recv(&mut self) -> Result<Multipart, ProtocolError>;

    /// Send a message to the router
    async fn send(&mut self, message: Multipart) -> Result<(), ProtocolError>;

    /// Close the channel, discarding anything still queued
    async fn close(&mut self) -> Result<(), ProtocolError>;
}

/// Opens dealer channels to a fixed endpoint
#[async_trait]
pub trait DealerConnector: Send + Sync {
    /// Connect with the given identity
    async fn connect(&self, identity: Identity) -> Result<Box<dyn DealerChannel>, ProtocolError>;

    /// Endpoint description used in logs
    fn endpoint(&self) -> &str;
}
