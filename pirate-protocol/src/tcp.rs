//! TCP addressed transport
//!
//! Every multipart message travels as one length-delimited record whose body
//! is a frame count followed by length-prefixed frames. The first record a
//! dealer sends on a fresh connection carries its identity.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::codec::{Framed, FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, trace, warn};

use crate::error::ProtocolError;
use crate::protocol::{Identity, Multipart};
use crate::transport::{DealerChannel, DealerConnector, RouterChannel};

/// Upper bound for one encoded message
pub const MAX_RECORD_LENGTH: usize = 64 * 1024 * 1024;

/// Pause after a failed accept, e.g. while out of file descriptors
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_RECORD_LENGTH)
        .new_codec()
}

/// Encode a multipart message into one record body
pub fn encode_multipart(message: &Multipart) -> Bytes {
    let size = 4 + message.iter().map(|f| 4 + f.len()).sum::<usize>();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u32(message.len() as u32);
    for frame in message.iter() {
        buf.put_u32(frame.len() as u32);
        buf.put_slice(frame);
    }
    buf.freeze()
}

/// Decode one record body into a multipart message
pub fn decode_multipart(mut record: Bytes) -> Result<Multipart, ProtocolError> {
    if record.remaining() < 4 {
        return Err(ProtocolError::InvalidMessage("record shorter than header".to_string()));
    }
    let count = record.get_u32() as usize;
    let mut frames = Vec::with_capacity(count.min(64));
    for index in 0..count {
        if record.remaining() < 4 {
            return Err(ProtocolError::InvalidMessage(format!(
                "frame {} is missing its length",
                index
            )));
        }
        let len = record.get_u32() as usize;
        if record.remaining() < len {
            return Err(ProtocolError::InvalidMessage(format!(
                "frame {} declares {} bytes but only {} remain",
                index,
                len,
                record.remaining()
            )));
        }
        frames.push(record.split_to(len));
    }
    if record.has_remaining() {
        return Err(ProtocolError::InvalidMessage(format!(
            "{} trailing bytes after {} frames",
            record.remaining(),
            count
        )));
    }
    Ok(Multipart::from(frames))
}

struct Peer {
    connection: u64,
    outbox: UnboundedSender<Multipart>,
}

type Peers = Arc<Mutex<HashMap<Identity, Peer>>>;

/// Router bound to a TCP listener
pub struct TcpRouter {
    local_addr: SocketAddr,
    peers: Peers,
    inbox: UnboundedReceiver<Multipart>,
    accept_task: JoinHandle<()>,
}

impl TcpRouter {
    /// Bind to `endpoint` (`host:port`) and start accepting dealers
    pub async fn bind(endpoint: &str) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(endpoint).await?;
        let local_addr = listener.local_addr()?;
        let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
        let (inbound, inbox) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(accept_loop(listener, peers.clone(), inbound));
        debug!(%local_addr, "router listening");

        Ok(Self {
            local_addr,
            peers,
            inbox,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpRouter {
    fn drop(&mut self) {
        self.accept_task.abort();
        // Dropping the outboxes stops every writer, which closes its socket half
        self.peers.lock().clear();
    }
}

async fn accept_loop(listener: TcpListener, peers: Peers, inbound: UnboundedSender<Multipart>) {
    let mut next_connection: u64 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let connection = next_connection;
                next_connection += 1;
                trace!(%addr, connection, "accepted connection");
                tokio::spawn(serve_connection(stream, connection, peers.clone(), inbound.clone()));
            }
            Err(e) => {
                if !accept_failed(&e, &inbound).await {
                    break;
                }
            }
        }
    }
}

/// Back off after a failed accept. Returns false once the router is gone.
async fn accept_failed(error: &std::io::Error, inbound: &UnboundedSender<Multipart>) -> bool {
    warn!("accept failed: {}", error);
    if inbound.is_closed() {
        return false;
    }
    sleep(ACCEPT_RETRY_DELAY).await;
    true
}

async fn serve_connection(
    stream: TcpStream,
    connection: u64,
    peers: Peers,
    inbound: UnboundedSender<Multipart>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, codec());
    let mut writer = FramedWrite::new(write_half, codec());

    // Handshake: the first record names the dealer
    let identity = match reader.next().await {
        Some(Ok(record)) => match decode_multipart(record.freeze()) {
            Ok(mut handshake) if handshake.len() == 1 => match handshake.unwrap_identity() {
                Some(identity) => identity,
                None => return,
            },
            _ => {
                warn!(connection, "invalid identity handshake");
                return;
            }
        },
        _ => return,
    };

    let (outbox, mut pending) = mpsc::unbounded_channel::<Multipart>();
    peers.lock().insert(identity.clone(), Peer { connection, outbox });

    let writer_task = tokio::spawn(async move {
        while let Some(message) = pending.recv().await {
            if let Err(e) = writer.send(encode_multipart(&message)).await {
                debug!("write failed: {}", e);
                break;
            }
        }
    });

    while let Some(record) = reader.next().await {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!(peer = %identity, "read failed: {}", e);
                break;
            }
        };
        match decode_multipart(record.freeze()) {
            Ok(mut message) => {
                message.wrap(&identity);
                if inbound.send(message).is_err() {
                    break;
                }
            }
            Err(e) => warn!(peer = %identity, "discarding undecodable record: {}", e),
        }
    }

    {
        let mut peers = peers.lock();
        // A reconnect with the same identity may already own the slot
        if peers.get(&identity).map(|p| p.connection) == Some(connection) {
            peers.remove(&identity);
        }
    }
    writer_task.abort();
    trace!(peer = %identity, "connection closed");
}

#[async_trait]
impl RouterChannel for TcpRouter {
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

        let outbox = self.peers.lock().get(&identity).map(|p| p.outbox.clone());
        let delivered = outbox.map(|tx| tx.send(message).is_ok()).unwrap_or(false);
        if !delivered {
            trace!(peer = %identity, "dropping message for unknown peer");
        }
        Ok(())
    }
}

/// Dealer connected over TCP
pub struct TcpDealer {
    identity: Identity,
    framed: Option<Framed<TcpStream, LengthDelimitedCodec>>,
}

impl TcpDealer {
    /// Connect to `endpoint` and announce `identity`
    pub async fn connect(endpoint: &str, identity: Identity) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, codec());

        let handshake = Multipart::from(vec![identity.to_frame()]);
        framed.send(encode_multipart(&handshake)).await?;

        Ok(Self {
            identity,
            framed: Some(framed),
        })
    }
}

#[async_trait]
impl DealerChannel for TcpDealer {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn recv(&mut self) -> Result<Multipart, ProtocolError> {
        let framed = self.framed.as_mut().ok_or(ProtocolError::NotConnected)?;
        match framed.next().await {
            Some(Ok(record)) => decode_multipart(record.freeze()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn send(&mut self, message: Multipart) -> Result<(), ProtocolError> {
        let framed = self.framed.as_mut().ok_or(ProtocolError::NotConnected)?;
        framed.send(encode_multipart(&message)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        // Dropping the stream closes the socket
        let _ = self.framed.take();
        Ok(())
    }
}

/// Opens [`TcpDealer`]s to one endpoint
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DealerConnector for TcpConnector {
    async fn connect(&self, identity: Identity) -> Result<Box<dyn DealerChannel>, ProtocolError> {
        Ok(Box::new(TcpDealer::connect(&self.endpoint, identity).await?))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
