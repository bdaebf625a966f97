//! The broker loop
//!
//! Clients talk to the frontend router, workers to the backend router. Each
//! [`Broker::tick`] waits at most one heartbeat interval for traffic,
//! handles backend traffic before frontend traffic, emits heartbeats to idle
//! workers when due and purges workers that stopped heartbeating.

use bytes::Bytes;
use pirate_config::{BrokerConfig, HeartbeatConfig, PirateConfig};
use pirate_protocol::{
    Identity, Multipart, ProtocolError, RouterChannel, Signal, TcpRouter, WorkerConfiguration,
};
use std::collections::{HashMap, VecDeque};
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::BrokerError;
use crate::queue::WorkerQueue;
use crate::run_cache::RunLanguageCache;
use crate::worker::WorkerRegistry;

/// Point-in-time view of the broker state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub registered_workers: usize,
    pub idle_workers: usize,
    pub cached_runs: usize,
    pub forwarded_requests: u64,
    pub forwarded_replies: u64,
    pub dropped_requests: u64,
}

#[derive(Debug, Default)]
struct Counters {
    forwarded_requests: u64,
    forwarded_replies: u64,
    dropped_requests: u64,
}

pub struct Broker<F, B> {
    heartbeat: HeartbeatConfig,
    frontend: F,
    backend: B,
    registry: WorkerRegistry,
    queue: WorkerQueue,
    runs: RunLanguageCache,
    /// Backend messages that arrived while waiting for a worker configuration
    deferred: VecDeque<Multipart>,
    /// Run of the request each busy worker is holding
    assignments: HashMap<Identity, Bytes>,
    heartbeat_at: Instant,
    counters: Counters,
}

impl Broker<TcpRouter, TcpRouter> {
    /// Bind both routers to the TCP endpoints of the broker configuration
    pub async fn bind_tcp(config: &PirateConfig) -> Result<Self, BrokerError> {
        let endpoints = config.broker_or_default();
        let frontend = bind_router(&endpoints.frontend, "frontend").await?;
        let backend = bind_router(&endpoints.backend, "backend").await?;
        info!(
            frontend = %frontend.local_addr(),
            backend = %backend.local_addr(),
            "broker bound"
        );
        Ok(Self::with_parts(config.heartbeat, &endpoints, frontend, backend))
    }
}

async fn bind_router(endpoint: &str, role: &str) -> Result<TcpRouter, BrokerError> {
    TcpRouter::bind(endpoint).await.map_err(|e| {
        BrokerError::TransportInterrupted(format!("cannot bind {} {}: {}", role, endpoint, e))
    })
}

impl<F, B> Broker<F, B>
where
    F: RouterChannel,
    B: RouterChannel,
{
    pub fn new(config: &PirateConfig, frontend: F, backend: B) -> Self {
        Self::with_parts(config.heartbeat, &config.broker_or_default(), frontend, backend)
    }

    fn with_parts(
        heartbeat: HeartbeatConfig,
        broker: &BrokerConfig,
        frontend: F,
        backend: B,
    ) -> Self {
        Self {
            heartbeat,
            frontend,
            backend,
            registry: WorkerRegistry::new(heartbeat.expiry_window()),
            queue: WorkerQueue::new(),
            runs: RunLanguageCache::new(broker.run_binding_ttl),
            deferred: VecDeque::new(),
            assignments: HashMap::new(),
            heartbeat_at: Instant::now() + heartbeat.interval,
            counters: Counters::default(),
        }
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &WorkerQueue {
        &self.queue
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            registered_workers: self.registry.len(),
            idle_workers: self.queue.len(),
            cached_runs: self.runs.len(),
            forwarded_requests: self.counters.forwarded_requests,
            forwarded_replies: self.counters.forwarded_replies,
            dropped_requests: self.counters.dropped_requests,
        }
    }

    /// Run until `shutdown` fires or the transport fails.
    ///
    /// Cancellation only cuts the wait for traffic short. A tick that already
    /// took a message finishes, so a READY is never half processed. The idle
    /// queue is emptied on exit; registered workers and run bindings stay
    /// with the broker.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), BrokerError> {
        info!(
            interval = ?self.heartbeat.interval,
            liveness = self.heartbeat.liveness,
            "broker started"
        );

        let result = loop {
            if shutdown.is_cancelled() {
                info!("broker shutting down");
                break Ok(());
            }
            if let Err(e) = self.tick_until(&shutdown).await {
                error!("broker stopped: {}", e);
                break Err(e);
            }
        };

        self.queue.clear();
        result
    }

    /// One iteration of the dispatch loop. Only fatal errors are returned.
    pub async fn tick(&mut self) -> Result<(), BrokerError> {
        self.tick_until(&CancellationToken::new()).await
    }

    async fn tick_until(&mut self, shutdown: &CancellationToken) -> Result<(), BrokerError> {
        let workers_available = !self.queue.is_empty();
        let (backend_message, frontend_message) = self.poll(shutdown).await?;

        if let Some(message) = backend_message {
            if let Err(e) = self.handle_backend(message).await {
                absorb(e)?;
            }
        }

        if let Some(message) = frontend_message {
            let result = if workers_available {
                self.handle_frontend(message).await
            } else {
                Err(BrokerError::NoWorkerAvailable)
            };
            if let Err(e) = result {
                if !e.is_fatal() {
                    self.counters.dropped_requests += 1;
                }
                absorb(e)?;
            }
        }

        self.send_heartbeats().await?;
        self.purge(Instant::now());
        Ok(())
    }

    /// Wait for traffic on either router. When one side wakes up the other is
    /// checked without waiting, so both may be handled in the same tick.
    async fn poll(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<(Option<Multipart>, Option<Multipart>), BrokerError> {
        if let Some(message) = self.deferred.pop_front() {
            let frontend = self.frontend.try_recv().map_err(interrupted)?;
            return Ok((Some(message), frontend));
        }

        let interval = self.heartbeat.interval;
        tokio::select! {
            biased;
            message = self.backend.recv() => {
                let message = message.map_err(interrupted)?;
                let frontend = self.frontend.try_recv().map_err(interrupted)?;
                Ok((Some(message), frontend))
            }
            message = self.frontend.recv() => {
                let message = message.map_err(interrupted)?;
                let backend = self.backend.try_recv().map_err(interrupted)?;
                Ok((backend, Some(message)))
            }
            _ = shutdown.cancelled() => Ok((None, None)),
            _ = sleep(interval) => Ok((None, None)),
        }
    }

    async fn handle_backend(&mut self, mut message: Multipart) -> Result<(), BrokerError> {
        let identity = message.unwrap_identity().ok_or_else(|| {
            BrokerError::MalformedMessage("backend message without identity".to_string())
        })?;

        if message.len() > 1 {
            self.release_assignment(&identity);
            debug!(worker = %identity, frames = message.len(), "forwarding reply to frontend");
            self.frontend.send(message).await?;
            self.counters.forwarded_replies += 1;
            return Ok(());
        }

        match message.first().and_then(|frame| Signal::from_frame(frame)) {
            Some(Signal::Ready) => {
                let config = self.receive_configuration(&identity).await?;
                self.release_assignment(&identity);
                let record = self.registry.register(identity.clone(), &config, Instant::now());
                info!(worker = %record, "registered worker");
                self.queue.push(identity);
            }
            Some(Signal::Heartbeat) => {
                self.registry.heartbeat(&identity, Instant::now())?;
                trace!(worker = %identity, "heartbeat");
                self.queue.push(identity);
            }
            None => {
                return Err(BrokerError::MalformedMessage(format!(
                    "invalid message from worker {}: {:?}",
                    identity, message
                )));
            }
        }
        Ok(())
    }

    /// The configuration follows READY from the same worker within one
    /// heartbeat interval. Traffic from other workers seen meanwhile is kept
    /// for the next ticks.
    async fn receive_configuration(
        &mut self,
        identity: &Identity,
    ) -> Result<WorkerConfiguration, BrokerError> {
        let mut message = match self.take_deferred_from(identity) {
            Some(message) => message,
            None => {
                let deadline = Instant::now() + self.heartbeat.interval;
                loop {
                    let message = timeout_at(deadline, self.backend.recv())
                        .await
                        .map_err(|_| {
                            BrokerError::MalformedMessage(format!(
                                "worker {} sent READY without configuration",
                                identity
                            ))
                        })?
                        .map_err(interrupted)?;
                    if is_from(&message, identity) {
                        break message;
                    }
                    self.deferred.push_back(message);
                }
            }
        };

        message.unwrap_identity();
        match (message.pop_front(), message.is_empty()) {
            (Some(frame), true) => WorkerConfiguration::from_frame(&frame).map_err(|e| {
                BrokerError::MalformedMessage(format!(
                    "invalid configuration from worker {}: {}",
                    identity, e
                ))
            }),
            _ => Err(BrokerError::MalformedMessage(format!(
                "configuration from worker {} must be a single frame",
                identity
            ))),
        }
    }

    fn take_deferred_from(&mut self, identity: &Identity) -> Option<Multipart> {
        let position = self.deferred.iter().position(|m| is_from(m, identity))?;
        self.deferred.remove(position)
    }

    /// Route a client request: `[client, empty, run, language?, payload..]`
    /// goes to a worker for the run's language, anything shorter to a
    /// configuration worker.
    async fn handle_frontend(&mut self, mut message: Multipart) -> Result<(), BrokerError> {
        let now = Instant::now();

        let (worker, run_id) = if message.len() >= 4 {
            let run_id = message.get(2).cloned().unwrap_or_default();
            let language = match self.runs.get(&run_id, now) {
                Some(language) => {
                    // A resent first message still carries its language frame
                    if message.len() >= 5 {
                        message.remove(3);
                    }
                    language
                }
                None => {
                    // The first message of a run must still carry a payload
                    // once the language frame is stripped
                    if message.len() < 5 {
                        return Err(BrokerError::MalformedMessage(format!(
                            "first message of run {} has no payload",
                            run_label(&run_id)
                        )));
                    }
                    let frame = message.remove(3).unwrap_or_default();
                    let language = parse_language(&frame)?;
                    info!(run_id = %run_label(&run_id), language, "bound run to language");
                    self.runs.bind(run_id.clone(), language, now)
                }
            };
            let worker = self.queue.pop_language(language, &self.registry)?;
            debug!(run_id = %run_label(&run_id), language, worker = %worker, "forwarding request");
            (worker, Some(run_id))
        } else {
            let worker = self.queue.pop_config(true, &self.registry)?;
            debug!(worker = %worker, "forwarding configuration request");
            (worker, None)
        };

        message.wrap(&worker);
        self.backend.send(message).await?;
        self.counters.forwarded_requests += 1;

        if let Some(run_id) = run_id {
            self.runs.pin(&run_id, now);
            if let Some(previous) = self.assignments.insert(worker, run_id) {
                self.runs.release(&previous, now);
            }
        }
        Ok(())
    }

    /// The worker is done with whatever run request it held
    fn release_assignment(&mut self, identity: &Identity) {
        if let Some(run_id) = self.assignments.remove(identity) {
            self.runs.release(&run_id, Instant::now());
        }
    }

    async fn send_heartbeats(&mut self) -> Result<(), BrokerError> {
        if Instant::now() < self.heartbeat_at {
            return Ok(());
        }

        let idle: Vec<Identity> = self.queue.iter().cloned().collect();
        for identity in &idle {
            let mut message = Signal::Heartbeat.message();
            message.wrap(identity);
            if let Err(e) = self.backend.send(message).await {
                absorb(e.into())?;
            }
        }
        if !idle.is_empty() {
            debug!(workers = idle.len(), "sent heartbeats");
        }

        // Advance from the previous deadline so a stall catches up gradually
        self.heartbeat_at += self.heartbeat.interval;
        Ok(())
    }

    fn purge(&mut self, now: Instant) {
        for identity in self.queue.purge(now, &self.registry) {
            info!(worker = %identity, "purged expired worker");
        }
        let evicted = self.runs.evict_expired(now);
        if evicted > 0 {
            debug!(evicted, "evicted idle run bindings");
        }
    }
}

/// Log a non-fatal error, pass a fatal one on
fn absorb(error: BrokerError) -> Result<(), BrokerError> {
    if error.is_fatal() {
        return Err(error);
    }
    warn!("{}", error);
    Ok(())
}

fn interrupted(error: ProtocolError) -> BrokerError {
    BrokerError::TransportInterrupted(error.to_string())
}

fn is_from(message: &Multipart, identity: &Identity) -> bool {
    message.first().map(|frame| frame.as_ref()) == Some(identity.as_bytes())
}

fn parse_language(frame: &[u8]) -> Result<i64, BrokerError> {
    std::str::from_utf8(frame)
        .ok()
        .and_then(|text| text.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            BrokerError::MalformedMessage(format!(
                "language frame is not a decimal id: {:?}",
                String::from_utf8_lossy(frame)
            ))
        })
}

fn run_label(run_id: &Bytes) -> String {
    String::from_utf8_lossy(run_id).into_owned()
}
