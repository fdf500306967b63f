/// Bridge event loop: the single ordering point for all session events
///
/// One task owns the [`RelaySession`] and drains a single event queue
/// fed by the accept loop, a per-connection reader task, and the
/// wireless-side [`RelayHandle`]. Serializing every event through this
/// task eliminates races on the connection slot and the subscription
/// flag without locks.
///
/// Within the loop, frame writes to the TCP peer happen inline, so a
/// slow peer can stall event processing. This is a known limitation
/// of the single-loop design.
use crate::session::{ReadError, RelaySession, TcpReceive};
use crate::transport::Notifier;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Relay bridge configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the TCP listener binds to
    pub listen_addr: SocketAddr,
    /// Upper bound for a single read from the TCP peer
    pub read_chunk: usize,
    /// Capacity of the bridge event queue
    pub event_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 8080).into(),
            read_chunk: 4096,
            event_queue: 64,
        }
    }
}

/// Relay bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to bind TCP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("Relay bridge has shut down")]
    Closed,
    #[error(transparent)]
    Read(#[from] ReadError),
}

enum Event {
    /// Bytes read from TCP connection `id`; empty means closed
    PeerBytes { id: u64, bytes: Vec<u8> },
    /// Wireless peer wrote to the characteristic
    WriteReceived(Vec<u8>),
    /// Wireless peer started listening for notifications
    Subscribe,
    /// Wireless peer stopped listening
    Unsubscribe,
    /// Wireless peer performs a pull-read
    Read(oneshot::Sender<Result<Vec<u8>, ReadError>>),
    /// Stop the event loop
    Shutdown,
}

/// Wireless-side handle into the bridge event loop.
///
/// The platform transport adapter calls these from its characteristic
/// callbacks; every call is queued behind the same ordering point as
/// the TCP events.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Event>,
}

impl RelayHandle {
    /// Forward a payload written by the wireless peer
    pub async fn write_received(&self, payload: Vec<u8>) -> Result<(), BridgeError> {
        self.tx
            .send(Event::WriteReceived(payload))
            .await
            .map_err(|_| BridgeError::Closed)
    }

    /// Mark the wireless peer as subscribed
    pub async fn subscribe(&self) -> Result<(), BridgeError> {
        self.tx
            .send(Event::Subscribe)
            .await
            .map_err(|_| BridgeError::Closed)
    }

    /// Mark the wireless peer as unsubscribed
    pub async fn unsubscribe(&self) -> Result<(), BridgeError> {
        self.tx
            .send(Event::Unsubscribe)
            .await
            .map_err(|_| BridgeError::Closed)
    }

    /// Pull-read the last notified value
    pub async fn read(&self) -> Result<Vec<u8>, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Event::Read(reply_tx))
            .await
            .map_err(|_| BridgeError::Closed)?;
        let value = reply_rx.await.map_err(|_| BridgeError::Closed)??;
        Ok(value)
    }

    /// Ask the bridge to stop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown).await;
    }
}

/// The relay bridge: TCP listener, active connection and session
pub struct RelayBridge<N> {
    listener: TcpListener,
    local_addr: SocketAddr,
    session: RelaySession<N, OwnedWriteHalf>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    read_chunk: usize,
    next_conn_id: u64,
    reader: Option<JoinHandle<()>>,
}

impl<N: Notifier> RelayBridge<N> {
    /// Bind the TCP listener and set up the event queue.
    ///
    /// A bind failure is fatal at startup; there is no retry loop.
    pub async fn bind(config: RelayConfig, notifier: N) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| BridgeError::Bind {
            addr: config.listen_addr,
            source,
        })?;
        info!(%local_addr, "listening for TCP peers");

        let (events_tx, events_rx) = mpsc::channel(config.event_queue);
        Ok(Self {
            listener,
            local_addr,
            session: RelaySession::new(notifier),
            events_tx,
            events_rx,
            read_chunk: config.read_chunk,
            next_conn_id: 0,
            reader: None,
        })
    }

    /// Address the listener actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for the wireless-side transport adapter
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Drive the bridge until shutdown.
    ///
    /// The listener stays registered for the whole process lifetime;
    /// each accepted connection replaces the prior active one.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.install_peer(stream, addr),
                    Err(err) => warn!(%err, "accept failed"),
                },
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if !self.dispatch(event).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        self.teardown_reader();
        info!("relay bridge stopped");
    }

    fn install_peer(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.next_conn_id += 1;
        let id = self.next_conn_id;
        info!(%addr, conn_id = id, "accepted TCP connection");

        // Tear the superseded connection down instead of leaking it:
        // aborting the reader drops the read half, replacing the
        // session peer drops the write half.
        self.teardown_reader();

        let (read_half, write_half) = stream.into_split();
        self.session.connection_accepted(id, write_half);
        self.reader = Some(tokio::spawn(pump_peer(
            read_half,
            id,
            self.read_chunk,
            self.events_tx.clone(),
        )));
    }

    fn teardown_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Apply one event to the session. Returns false on shutdown.
    async fn dispatch(&mut self, event: Event) -> bool {
        match event {
            Event::PeerBytes { id, bytes } => {
                if self.session.tcp_bytes_received(id, &bytes).await == TcpReceive::Closed {
                    self.teardown_reader();
                }
            }
            Event::WriteReceived(payload) => {
                if let Err(err) = self.session.wire_value_written(&payload).await {
                    warn!(%err, "rejecting wireless write");
                }
            }
            Event::Subscribe => self.session.subscribe(),
            Event::Unsubscribe => self.session.unsubscribe(),
            Event::Read(reply) => {
                let _ = reply.send(self.session.read());
            }
            Event::Shutdown => return false,
        }
        true
    }
}

/// Per-connection reader: bounded reads funneled into the event queue.
///
/// Sends an empty chunk on EOF or read error so the session treats
/// both as a peer close, then exits.
async fn pump_peer(
    mut read_half: OwnedReadHalf,
    id: u64,
    read_chunk: usize,
    events: mpsc::Sender<Event>,
) {
    let mut buf = vec![0u8; read_chunk];
    loop {
        let bytes = match read_half.read(&mut buf).await {
            Ok(0) => Vec::new(),
            Ok(n) => buf[..n].to_vec(),
            Err(err) => {
                debug!(conn_id = id, %err, "TCP read failed");
                Vec::new()
            }
        };
        let closed = bytes.is_empty();
        if events.send(Event::PeerBytes { id, bytes }).await.is_err() || closed {
            break;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.read_chunk, 4096);
    }
}
