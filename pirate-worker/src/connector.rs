//! Worker side of the Paranoid Pirate protocol
//!
//! A [`Connector`] registers with the broker backend, answers routed
//! requests through its handlers and keeps heartbeating. When the broker
//! stays silent for `liveness` intervals the connector waits out a growing
//! backoff delay and registers again under a fresh identity.

use bytes::Bytes;
use pirate_config::{HeartbeatConfig, PirateConfig, WorkerConfig};
use pirate_protocol::{
    DealerChannel, DealerConnector, Envelope, Identity, Multipart, Signal, TcpConnector,
    WorkerConfiguration,
};
use pirate_resilience::{BackoffPolicy, ReconnectBackoff};
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{OperationRegistry, Request};
use crate::error::ConnectorError;
use crate::handler::{ConfigurationHandler, OptimizationHandler};

/// Point-in-time view of the connector state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorStats {
    pub identity: Option<Identity>,
    pub liveness: u32,
    pub reconnects: u64,
    pub requests_handled: u64,
    pub requests_failed: u64,
}

pub struct Connector<H: OptimizationHandler> {
    heartbeat: HeartbeatConfig,
    worker: WorkerConfig,
    transport: Box<dyn DealerConnector>,
    handler: H,
    configuration_handler: Option<Box<dyn ConfigurationHandler>>,
    operations: OperationRegistry<H::Operation>,
    channel: Option<Box<dyn DealerChannel>>,
    identity: Option<Identity>,
    liveness: u32,
    backoff: ReconnectBackoff,
    heartbeat_at: Instant,
    reconnects: u64,
    requests_handled: u64,
    requests_failed: u64,
}

impl<H: OptimizationHandler> Connector<H> {
    pub fn new(
        config: &PirateConfig,
        transport: impl DealerConnector + 'static,
        handler: H,
    ) -> Self {
        let worker = config.worker_or_default();
        let backoff = ReconnectBackoff::new(BackoffPolicy::doubling(
            worker.interval_init,
            worker.interval_max,
        ));

        Self {
            heartbeat: config.heartbeat,
            liveness: config.heartbeat.liveness,
            heartbeat_at: Instant::now() + config.heartbeat.interval,
            worker,
            transport: Box::new(transport),
            handler,
            configuration_handler: None,
            operations: OperationRegistry::new(),
            channel: None,
            identity: None,
            backoff,
            reconnects: 0,
            requests_handled: 0,
            requests_failed: 0,
        }
    }

    /// Connector dialing the configured worker backend over TCP
    pub fn tcp(config: &PirateConfig, handler: H) -> Self {
        let endpoint = config.worker_or_default().backend;
        Self::new(config, TcpConnector::new(endpoint), handler)
    }

    /// Also answer configuration requests; the worker then registers as a
    /// configuration worker
    pub fn with_configuration_handler(
        mut self,
        handler: impl ConfigurationHandler + 'static,
    ) -> Self {
        self.configuration_handler = Some(Box::new(handler));
        self
    }

    /// Operations this worker can decode and hand to [`OptimizationHandler::operate`]
    pub fn with_operations(mut self, operations: OperationRegistry<H::Operation>) -> Self {
        self.operations = operations;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Identity of the current registration
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn liveness(&self) -> u32 {
        self.liveness
    }

    pub fn stats(&self) -> ConnectorStats {
        ConnectorStats {
            identity: self.identity.clone(),
            liveness: self.liveness,
            reconnects: self.reconnects,
            requests_handled: self.requests_handled,
            requests_failed: self.requests_failed,
        }
    }

    /// Register with the broker unless already connected
    pub async fn start(&mut self) -> Result<(), ConnectorError> {
        if self.channel.is_none() {
            self.connect().await?;
        }
        Ok(())
    }

    /// Serve requests until `shutdown` fires
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ConnectorError> {
        info!(
            endpoint = self.transport.endpoint(),
            languages = ?self.worker.supported_languages,
            operations = ?self.operations.message_names(),
            "worker connector started"
        );

        let result = match self.start().await {
            Err(e) => Err(e),
            Ok(()) => loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        info!("worker connector shutting down");
                        break Ok(());
                    }
                    result = self.tick() => {
                        if let Err(e) = result {
                            error!("worker connector stopped: {}", e);
                            break Err(e);
                        }
                    }
                }
            },
        };

        self.disconnect().await;
        result
    }

    /// One iteration of the worker loop. Only fatal errors are returned.
    pub async fn tick(&mut self) -> Result<(), ConnectorError> {
        match self.poll().await {
            Some(message) => self.handle_message(message).await,
            None => self.handle_silence().await?,
        }
        self.send_heartbeat().await;
        Ok(())
    }

    /// Wait at most one heartbeat interval for a message from the broker
    async fn poll(&mut self) -> Option<Multipart> {
        let deadline = Instant::now() + self.heartbeat.interval;
        if let Some(channel) = self.channel.as_mut() {
            match timeout_at(deadline, channel.recv()).await {
                Ok(Ok(message)) => return Some(message),
                Ok(Err(e)) => {
                    warn!("lost connection to broker: {}", e);
                    self.channel = None;
                }
                Err(_) => return None,
            }
        }
        sleep_until(deadline).await;
        None
    }

    async fn handle_message(&mut self, mut message: Multipart) {
        if message.len() >= 3 {
            self.mark_alive();
            let Some(payload) = message.pop_back() else {
                return;
            };
            // Exactly [client, empty, run] remain when the broker forwarded a run id
            let run_id = if message.len() == 3 {
                message
                    .pop_back()
                    .map(|frame| String::from_utf8_lossy(&frame).into_owned())
            } else {
                None
            };

            match self.process(run_id.as_deref(), &payload).await {
                Ok(response) => self.reply(message, &response).await,
                Err(e) => {
                    self.requests_failed += 1;
                    warn!(run = run_id.as_deref().unwrap_or("-"), "request not answered: {}", e);
                }
            }
        } else if message.len() == 1 && Signal::from_frame(&message[0]) == Some(Signal::Heartbeat) {
            debug!("broker heartbeat");
            self.mark_alive();
        } else {
            warn!(frames = message.len(), "invalid message: {:?}", message);
        }
    }

    async fn process(
        &mut self,
        run_id: Option<&str>,
        payload: &Bytes,
    ) -> Result<Envelope, ConnectorError> {
        let request = Envelope::from_frame(payload)?;
        if self.worker.log_messages {
            debug!(
                run = run_id.unwrap_or("-"),
                message = request.message_name(),
                bytes = request.payload.len(),
                "received request"
            );
        }

        let response = self.dispatch(run_id, &request).await?;
        if self.worker.log_responses {
            debug!(
                run = run_id.unwrap_or("-"),
                message = response.message_name(),
                bytes = response.payload.len(),
                "sending response"
            );
        }
        Ok(response)
    }

    async fn dispatch(
        &mut self,
        run_id: Option<&str>,
        request: &Envelope,
    ) -> Result<Envelope, ConnectorError> {
        match self.operations.classify(request)? {
            Request::Configuration => match self.configuration_handler.as_mut() {
                Some(handler) => handler.get_configuration(request).await,
                None => {
                    warn!("configuration request received, but no configuration handler is set");
                    Ok(Envelope::empty())
                }
            },
            Request::StartAlgorithm => self.handler.configure(run_id, request).await,
            Request::StopAlgorithm => {
                self.handler.shutdown(run_id, request).await?;
                Ok(Envelope::empty())
            }
            Request::Operation(operation) => self.handler.operate(run_id, operation).await,
        }
    }

    /// Send `response` back along the address frames of the request
    async fn reply(&mut self, mut address: Multipart, response: &Envelope) {
        let frame = match response.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.requests_failed += 1;
                warn!("failed to encode response: {}", e);
                return;
            }
        };
        address.push_back(frame);
        self.requests_handled += 1;
        self.send(address).await;
    }

    async fn handle_silence(&mut self) -> Result<(), ConnectorError> {
        self.liveness = self.liveness.saturating_sub(1);
        if self.liveness > 0 {
            return Ok(());
        }

        let delay = self.backoff.next_delay();
        warn!(delay = ?delay, "heartbeat failure, can't reach broker");
        sleep(delay).await;

        self.disconnect().await;
        self.reconnects += 1;
        info!(attempt = self.backoff.attempts(), "reconnecting to broker");
        self.connect().await?;
        self.liveness = self.heartbeat.liveness;
        Ok(())
    }

    async fn send_heartbeat(&mut self) {
        let now = Instant::now();
        if now > self.heartbeat_at {
            self.heartbeat_at = now + self.heartbeat.interval;
            if self.channel.is_some() {
                self.send(Signal::Heartbeat.message()).await;
            }
        }
    }

    fn mark_alive(&mut self) {
        self.liveness = self.heartbeat.liveness;
        self.backoff.reset();
    }

    /// Open a channel under a fresh identity, announce READY and the worker
    /// configuration. Unreachable brokers are retried on the next liveness
    /// exhaustion; other connect failures are fatal.
    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let identity = Identity::random();
        let mut channel = match self.transport.connect(identity.clone()).await {
            Ok(channel) => channel,
            Err(e) if e.is_retryable() => {
                warn!(endpoint = self.transport.endpoint(), "broker unreachable: {}", e);
                return Ok(());
            }
            Err(e) => {
                return Err(ConnectorError::TransportInterrupted(format!(
                    "cannot connect to {}: {}",
                    self.transport.endpoint(),
                    e
                )))
            }
        };

        let configuration = WorkerConfiguration::new(
            self.worker.supported_languages.clone(),
            self.configuration_handler.is_some(),
        );
        let announced = async {
            channel.send(Signal::Ready.message()).await?;
            channel
                .send(Multipart::from(vec![configuration.to_frame()?]))
                .await
        }
        .await;

        match announced {
            Ok(()) => {
                info!(
                    identity = %identity,
                    endpoint = self.transport.endpoint(),
                    "registered with broker"
                );
                self.identity = Some(identity);
                self.channel = Some(channel);
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!("failed to register with broker: {}", e);
                Ok(())
            }
            Err(e) => Err(ConnectorError::TransportInterrupted(e.to_string())),
        }
    }

    async fn send(&mut self, message: Multipart) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = channel.send(message).await {
            warn!("failed to send to broker: {}", e);
            if e.is_fatal() {
                self.channel = None;
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("error closing broker channel: {}", e);
            }
        }
    }
}
