//! Client side of the broker frontend
//!
//! Requests follow the lazy pirate pattern: when no reply arrives in time the
//! connection is dropped, a new one is opened under a fresh identity and the
//! identical request is sent again, up to a fixed number of attempts.

use bytes::Bytes;
use pirate_config::{ClientConfig, PirateConfig};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::protocol::{Envelope, Identity, Multipart};
use crate::tcp::TcpConnector;
use crate::transport::{DealerChannel, DealerConnector};

/// Sends requests to the broker frontend and waits for the routed replies.
///
/// A run's language id frame is attached until the first reply for that run
/// has come back; only then is the broker known to hold the binding.
pub struct BrokerClient {
    connector: Box<dyn DealerConnector>,
    channel: Option<Box<dyn DealerChannel>>,
    timeout: Duration,
    retries: u32,
    bound_runs: HashSet<String>,
}

impl BrokerClient {
    /// `retries` is the number of attempts per request; zero counts as one
    pub fn new(connector: impl DealerConnector + 'static, timeout: Duration, retries: u32) -> Self {
        Self {
            connector: Box::new(connector),
            channel: None,
            timeout,
            retries: retries.max(1),
            bound_runs: HashSet::new(),
        }
    }

    pub fn from_config(connector: impl DealerConnector + 'static, config: &ClientConfig) -> Self {
        Self::new(connector, config.timeout, config.retries)
    }

    /// Client dialing the configured broker frontend over TCP
    pub fn tcp(config: &PirateConfig) -> Self {
        let client = config.client_or_default();
        Self::from_config(TcpConnector::new(client.frontend.clone()), &client)
    }

    /// Identity of the open connection, if any
    pub fn identity(&self) -> Option<&Identity> {
        self.channel.as_ref().map(|channel| channel.identity())
    }

    /// Whether the broker has answered a request of `run_id` before
    pub fn is_bound(&self, run_id: &str) -> bool {
        self.bound_runs.contains(run_id)
    }

    /// Send a request belonging to `run_id` and wait for its response
    pub async fn request(
        &mut self,
        run_id: &str,
        language: i64,
        request: &Envelope,
    ) -> Result<Envelope, ProtocolError> {
        let mut message = Multipart::new();
        message.push_back(Bytes::new());
        message.push_back(Bytes::copy_from_slice(run_id.as_bytes()));
        if !self.is_bound(run_id) {
            message.push_back(Bytes::from(language.to_string()));
        }
        message.push_back(request.to_frame()?);

        let response = self.exchange(message).await?;
        self.bound_runs.insert(run_id.to_string());
        Ok(response)
    }

    /// Send a run-less request, routed to a configuration worker
    pub async fn configuration(&mut self, request: &Envelope) -> Result<Envelope, ProtocolError> {
        let mut message = Multipart::new();
        message.push_back(Bytes::new());
        message.push_back(request.to_frame()?);
        self.exchange(message).await
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        match self.channel.take() {
            Some(mut channel) => channel.close().await,
            None => Ok(()),
        }
    }

    async fn exchange(&mut self, message: Multipart) -> Result<Envelope, ProtocolError> {
        for attempt in 1..=self.retries {
            match self.attempt(message.clone()).await {
                Ok(reply) => return decode_reply(reply),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    warn!(attempt, retries = self.retries, "no reply from broker: {}", e);
                    self.reset().await;
                }
                Err(e) => {
                    self.reset().await;
                    return Err(e);
                }
            }
        }
        Err(ProtocolError::Timeout)
    }

    async fn attempt(&mut self, message: Multipart) -> Result<Multipart, ProtocolError> {
        if self.channel.is_none() {
            let channel = self.connector.connect(Identity::random()).await?;
            debug!(
                identity = %channel.identity(),
                endpoint = self.connector.endpoint(),
                "connected to broker"
            );
            self.channel = Some(channel);
        }
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        channel.send(message).await?;
        timeout(self.timeout, channel.recv())
            .await
            .map_err(|_| ProtocolError::Timeout)?
    }

    /// Drop the current connection; late replies to it are lost with it
    async fn reset(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("closing stale connection failed: {}", e);
            }
        }
    }
}

fn decode_reply(mut reply: Multipart) -> Result<Envelope, ProtocolError> {
    debug!(frames = reply.len(), "received reply");
    let payload = reply
        .pop_back()
        .ok_or_else(|| ProtocolError::InvalidMessage("empty reply".to_string()))?;
    Envelope::from_frame(&payload)
}
