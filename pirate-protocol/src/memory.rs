//! In-process addressed transport
//!
//! Endpoints live in a [`MemoryHub`] owned by the caller, so several
//! independent hubs (and brokers) can coexist in one process. Like a socket
//! based router, a dealer may connect before the router binds and messages
//! sent while nobody is bound are silently dropped.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::ProtocolError;
use crate::protocol::{Identity, Multipart};
use crate::transport::{DealerChannel, DealerConnector, RouterChannel};

#[derive(Default)]
struct EndpointState {
    /// Inbox of the bound router, if any
    router: Option<UnboundedSender<Multipart>>,
    /// Inboxes of connected dealers
    dealers: HashMap<Identity, UnboundedSender<Multipart>>,
}

type Endpoints = Arc<Mutex<HashMap<String, EndpointState>>>;

/// Registry of in-memory endpoints
#[derive(Clone, Default)]
pub struct MemoryHub {
    endpoints: Endpoints,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a router to `endpoint`
    pub fn bind(&self, endpoint: impl Into<String>) -> Result<MemoryRouter, ProtocolError> {
        let endpoint = endpoint.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.clone()).or_default();
        if state.router.is_some() {
            return Err(ProtocolError::AddressInUse(endpoint));
        }
        state.router = Some(tx);

        Ok(MemoryRouter {
            endpoint,
            endpoints: self.endpoints.clone(),
            inbox: rx,
        })
    }

    /// Connect a dealer with `identity` to `endpoint`
    pub fn connect(&self, endpoint: impl Into<String>, identity: Identity) -> MemoryDealer {
        let endpoint = endpoint.into();
        let (tx, rx) = mpsc::unbounded_channel();

        self.endpoints
            .lock()
            .entry(endpoint.clone())
            .or_default()
            .dealers
            .insert(identity.clone(), tx);

        MemoryDealer {
            identity,
            endpoint,
            endpoints: self.endpoints.clone(),
            inbox: rx,
        }
    }

    /// Connector factory for `endpoint`
    pub fn connector(&self, endpoint: impl Into<String>) -> MemoryConnector {
        MemoryConnector {
            hub: self.clone(),
            endpoint: endpoint.into(),
        }
    }

    /// Whether a router is currently bound to `endpoint`
    pub fn is_bound(&self, endpoint: &str) -> bool {
        self.endpoints
            .lock()
            .get(endpoint)
            .map(|state| state.router.is_some())
            .unwrap_or(false)
    }
}

/// Router end of an in-memory endpoint
pub struct MemoryRouter {
    endpoint: String,
    endpoints: Endpoints,
    inbox: UnboundedReceiver<Multipart>,
}

impl MemoryRouter {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RouterChannel for MemoryRouter {
    async fn recv(&mut self) -> Result<Multipart, ProtocolError> {
        self.inbox.recv().await.ok_or(ProtocolError::ConnectionClosed)
    }

    fn try_recv(&mut self) -> Result<Option<Multipart>, ProtocolError> {
        match self.inbox.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn send(&mut self, mut message: Multipart) -> Result<(), ProtocolError> {
        let identity = message
            .unwrap_identity()
            .ok_or_else(|| ProtocolError::InvalidMessage("missing destination frame".to_string()))?;

        let peer = self
            .endpoints
            .lock()
            .get(&self.endpoint)
            .and_then(|state| state.dealers.get(&identity).cloned());

        let delivered = peer.map(|peer| peer.send(message).is_ok()).unwrap_or(false);
        if !delivered {
            trace!(endpoint = %self.endpoint, peer = %identity, "dropping message for unknown peer");
        }
        Ok(())
    }
}

impl Drop for MemoryRouter {
    fn drop(&mut self) {
        if let Some(state) = self.endpoints.lock().get_mut(&self.endpoint) {
            state.router = None;
        }
    }
}

/// Dealer end of an in-memory endpoint
pub struct MemoryDealer {
    identity: Identity,
    endpoint: String,
    endpoints: Endpoints,
    inbox: UnboundedReceiver<Multipart>,
}

impl MemoryDealer {
    fn detach(&self) {
        if let Some(state) = self.endpoints.lock().get_mut(&self.endpoint) {
            state.dealers.remove(&self.identity);
        }
    }
}

#[async_trait]
impl DealerChannel for MemoryDealer {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn recv(&mut self) -> Result<Multipart, ProtocolError> {
        self.inbox.recv().await.ok_or(ProtocolError::ConnectionClosed)
    }

    async fn send(&mut self, mut message: Multipart) -> Result<(), ProtocolError> {
        let router = self
            .endpoints
            .lock()
            .get(&self.endpoint)
            .and_then(|state| state.router.clone());

        message.wrap(&self.identity);
        let delivered = router.map(|router| router.send(message).is_ok()).unwrap_or(false);
        if !delivered {
            trace!(endpoint = %self.endpoint, "no router bound, dropping message");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        self.detach();
        self.inbox.close();
        Ok(())
    }
}

impl Drop for MemoryDealer {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Opens [`MemoryDealer`]s to one endpoint of a hub
#[derive(Clone)]
pub struct MemoryConnector {
    hub: MemoryHub,
    endpoint: String,
}

#[async_trait]
impl DealerConnector for MemoryConnector {
    async fn connect(&self, identity: Identity) -> Result<Box<dyn DealerChannel>, ProtocolError> {
        Ok(Box::new(self.hub.connect(self.endpoint.clone(), identity)))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frames(parts: &[&'static str]) -> Multipart {
        parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect()
    }

    #[tokio::test]
    async fn test_router_sees_dealer_identity() {
        let hub = MemoryHub::new();
        let mut router = hub.bind("backend").unwrap();
        let identity = Identity::new(Bytes::from_static(b"worker-a"));
        let mut dealer = hub.connect("backend", identity.clone());

        dealer.send(frames(&["hello"])).await.unwrap();

        let mut received = router.recv().await.unwrap();
        assert_eq!(received.unwrap_identity(), Some(identity.clone()));
        assert_eq!(received, frames(&["hello"]));

        let mut reply = frames(&["world"]);
        reply.wrap(&identity);
        router.send(reply).await.unwrap();
        assert_eq!(dealer.recv().await.unwrap(), frames(&["world"]));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_dropped() {
        let hub = MemoryHub::new();
        let mut router = hub.bind("backend").unwrap();

        let mut msg = frames(&["lost"]);
        msg.wrap(&Identity::new(Bytes::from_static(b"nobody")));
        assert!(router.send(msg).await.is_ok());
        assert!(router.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_double_bind_fails() {
        let hub = MemoryHub::new();
        let _router = hub.bind("frontend").unwrap();
        assert!(matches!(hub.bind("frontend"), Err(ProtocolError::AddressInUse(_))));
    }

    #[tokio::test]
    async fn test_rebind_after_drop() {
        let hub = MemoryHub::new();
        let router = hub.bind("frontend").unwrap();
        assert!(hub.is_bound("frontend"));
        drop(router);
        assert!(!hub.is_bound("frontend"));
        assert!(hub.bind("frontend").is_ok());
    }

    #[tokio::test]
    async fn test_dealer_connects_before_bind() {
        let hub = MemoryHub::new();
        let identity = Identity::random();
        let mut dealer = hub.connect("late", identity.clone());

        // Nobody is listening yet; the message vanishes
        dealer.send(frames(&["early"])).await.unwrap();

        let mut router = hub.bind("late").unwrap();
        dealer.send(frames(&["on time"])).await.unwrap();

        let mut received = router.recv().await.unwrap();
        assert_eq!(received.unwrap_identity(), Some(identity));
        assert_eq!(received, frames(&["on time"]));
        assert!(router.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_dealer_is_unroutable() {
        let hub = MemoryHub::new();
        let mut router = hub.bind("backend").unwrap();
        let identity = Identity::random();
        let mut dealer = hub.connect("backend", identity.clone());
        dealer.close().await.unwrap();

        let mut msg = frames(&["gone"]);
        msg.wrap(&identity);
        router.send(msg).await.unwrap();
        assert!(dealer.recv().await.is_err());
    }
}
