/// Relay session: one TCP peer bridged to the wireless notify/write path
///
/// The session owns the write half of at most one TCP connection plus
/// the subscription flag and the last-notified-value cache. Wireless
/// writes are frame-encoded and forwarded to the peer; bytes received
/// from the peer are forwarded unframed as notification payloads. All
/// methods must be called from a single task (the bridge event loop
/// guarantees this), so no locking is needed on the mutable state.
use crate::frame::{self, FrameError};
use crate::transport::Notifier;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Connection lifecycle for the TCP side.
///
/// Orthogonal to the subscription flag: a wireless peer may be
/// subscribed while no TCP peer is attached, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Errors for pull-reads of the characteristic value
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("No value has been notified yet")]
    NoValue,
}

/// Outcome of feeding received TCP bytes into the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpReceive {
    /// Bytes were forwarded as a notification payload
    Forwarded,
    /// Zero-length read: the peer closed, the connection slot is now empty
    Closed,
    /// Bytes came from a connection that has already been replaced
    Stale,
}

struct ActivePeer<W> {
    id: u64,
    writer: W,
}

/// Bridge state tying one TCP connection to the wireless subscription flag
pub struct RelaySession<N, W> {
    peer: Option<ActivePeer<W>>,
    notifying: bool,
    last_value: Option<Vec<u8>>,
    notifier: N,
}

impl<N, W> RelaySession<N, W>
where
    N: Notifier,
    W: AsyncWrite + Unpin,
{
    /// Create a session with no peer attached and notifications off
    pub fn new(notifier: N) -> Self {
        Self {
            peer: None,
            notifying: false,
            last_value: None,
            notifier,
        }
    }

    /// Current TCP-side state
    pub fn connection_state(&self) -> ConnectionState {
        if self.peer.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Whether a wireless peer is subscribed for notifications
    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// Install a newly accepted connection as the active peer.
    ///
    /// The newest connection always wins. Any previous peer is dropped
    /// here, which closes its write half; the caller is responsible
    /// for tearing down the matching reader.
    pub fn connection_accepted(&mut self, id: u64, writer: W) {
        if self.peer.is_some() {
            info!(conn_id = id, "replacing previous TCP peer");
        } else {
            info!(conn_id = id, "TCP peer attached");
        }
        self.peer = Some(ActivePeer { id, writer });
    }

    /// Forward a wireless write to the TCP peer as a 256-byte frame.
    ///
    /// Rejects payloads the frame cannot represent. With no peer
    /// attached the payload is dropped with a warning; the wireless
    /// side is never told. A failed TCP write clears the peer slot.
    pub async fn wire_value_written(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = frame::encode(payload)?;
        debug!(data = %hex::encode(payload), "received wireless write");

        let Some(peer) = self.peer.as_mut() else {
            warn!(len = payload.len(), "no TCP peer attached, dropping write");
            return Ok(());
        };

        if let Err(err) = peer.writer.write_all(&frame).await {
            warn!(conn_id = peer.id, %err, "TCP write failed, detaching peer");
            self.peer = None;
        }
        Ok(())
    }

    /// Feed bytes read from a TCP connection into the session.
    ///
    /// Events from a replaced connection are ignored. An empty read is
    /// the peer-initiated close: the slot is cleared and [`TcpReceive::Closed`]
    /// returned so the caller can stop watching the socket. Anything
    /// else is forwarded verbatim as a notification payload; the frame
    /// codec is never applied on this path.
    pub async fn tcp_bytes_received(&mut self, id: u64, bytes: &[u8]) -> TcpReceive {
        match self.peer.as_ref() {
            Some(peer) if peer.id == id => {}
            _ => return TcpReceive::Stale,
        }

        if bytes.is_empty() {
            info!(conn_id = id, "TCP peer closed connection");
            self.peer = None;
            return TcpReceive::Closed;
        }

        self.send_notification(bytes).await;
        TcpReceive::Forwarded
    }

    /// Push a payload to the wireless side if a peer is subscribed.
    ///
    /// Updates the last-notified-value cache, then hands the raw
    /// (unframed) payload to the transport adapter. Silently skipped
    /// while unsubscribed.
    pub async fn send_notification(&mut self, payload: &[u8]) {
        if !self.notifying {
            debug!(len = payload.len(), "not notifying, skipping payload");
            return;
        }
        debug!(data = %hex::encode(payload), "sending notification");
        self.last_value = Some(payload.to_vec());
        self.notifier.notify(payload).await;
    }

    /// Mark the wireless peer as subscribed. Idempotent.
    pub fn subscribe(&mut self) {
        if self.notifying {
            debug!("already notifying, nothing to do");
            return;
        }
        info!("wireless peer subscribed");
        self.notifying = true;
    }

    /// Mark the wireless peer as unsubscribed. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.notifying {
            debug!("not notifying, nothing to do");
            return;
        }
        info!("wireless peer unsubscribed");
        self.notifying = false;
    }

    /// Return the last notified value for a pull-read
    pub fn read(&self) -> Result<Vec<u8>, ReadError> {
        self.last_value.clone().ok_or(ReadError::NoValue)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_LEN;
    use crate::transport::ChannelNotifier;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::sync::mpsc::UnboundedReceiver;

    type TestSession = RelaySession<ChannelNotifier, DuplexStream>;

    fn test_session() -> (TestSession, UnboundedReceiver<Vec<u8>>) {
        let (notifier, rx) = ChannelNotifier::new();
        (RelaySession::new(notifier), rx)
    }

    async fn read_frame(conn: &mut DuplexStream) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        conn.read_exact(&mut frame).await.expect("Failed to read frame");
        frame
    }

    #[tokio::test]
    async fn test_wire_write_produces_frame() {
        let (mut session, _rx) = test_session();
        let (mut client, server) = duplex(1024);
        session.connection_accepted(1, server);

        session
            .wire_value_written(&[0x01, 0x02, 0x03])
            .await
            .expect("Failed to write");

        let frame = read_frame(&mut client).await;
        assert_eq!(frame[0], 0x03);
        assert_eq!(&frame[1..4], &[0x01, 0x02, 0x03]);
        assert!(frame[4..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_wire_write_without_peer_is_dropped() {
        let (mut session, _rx) = test_session();

        // No peer attached: silently dropped
        session
            .wire_value_written(&[0xAA])
            .await
            .expect("Drop should not error");
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        // A peer attached afterwards sees only what is written next
        let (mut client, server) = duplex(1024);
        session.connection_accepted(1, server);
        session
            .wire_value_written(&[0xBB])
            .await
            .expect("Failed to write");

        let frame = read_frame(&mut client).await;
        assert_eq!(frame[0], 1);
        assert_eq!(frame[1], 0xBB);
    }

    #[tokio::test]
    async fn test_wire_write_oversized_payload_rejected() {
        let (mut session, _rx) = test_session();
        let (_client, server) = duplex(1024);
        session.connection_accepted(1, server);

        let payload = vec![0u8; FRAME_LEN];
        let result = session.wire_value_written(&payload).await;
        assert_eq!(result, Err(FrameError::PayloadTooLarge(FRAME_LEN)));
    }

    #[tokio::test]
    async fn test_reconnection_replaces_peer() {
        let (mut session, _rx) = test_session();
        let (mut client_a, server_a) = duplex(1024);
        let (mut client_b, server_b) = duplex(1024);

        session.connection_accepted(1, server_a);
        session.connection_accepted(2, server_b);

        session
            .wire_value_written(&[0x42])
            .await
            .expect("Failed to write");

        // B receives the frame; A's server half was dropped, so A sees EOF
        let frame = read_frame(&mut client_b).await;
        assert_eq!(frame[0], 1);
        assert_eq!(frame[1], 0x42);

        let mut buf = [0u8; 16];
        assert_eq!(client_a.read(&mut buf).await.expect("read"), 0);
    }

    #[tokio::test]
    async fn test_notification_gated_on_subscription() {
        let (mut session, mut rx) = test_session();

        session.send_notification(b"quiet").await;
        assert!(rx.try_recv().is_err());
        assert_eq!(session.read(), Err(ReadError::NoValue));

        session.subscribe();
        session.send_notification(b"loud").await;
        assert_eq!(rx.try_recv().expect("Expected notification"), b"loud");
        assert_eq!(session.read(), Ok(b"loud".to_vec()));
    }

    #[tokio::test]
    async fn test_tcp_bytes_forwarded_unframed() {
        let (mut session, mut rx) = test_session();
        let (_client, server) = duplex(1024);
        session.connection_accepted(1, server);
        session.subscribe();

        let outcome = session.tcp_bytes_received(1, b"hello").await;
        assert_eq!(outcome, TcpReceive::Forwarded);
        assert_eq!(rx.try_recv().expect("Expected notification"), b"hello");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_zero_length_read_closes_connection() {
        let (mut session, _rx) = test_session();
        let (_client, server) = duplex(1024);
        session.connection_accepted(1, server);

        let outcome = session.tcp_bytes_received(1, &[]).await;
        assert_eq!(outcome, TcpReceive::Closed);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        // Subsequent wireless writes are silent no-ops
        session
            .wire_value_written(&[0x01])
            .await
            .expect("Drop should not error");
    }

    #[tokio::test]
    async fn test_stale_connection_events_ignored() {
        let (mut session, mut rx) = test_session();
        let (_client_a, server_a) = duplex(1024);
        let (_client_b, server_b) = duplex(1024);
        session.subscribe();

        session.connection_accepted(1, server_a);
        session.connection_accepted(2, server_b);

        // Late bytes (or close) from the replaced connection must not
        // touch the active one
        assert_eq!(session.tcp_bytes_received(1, b"late").await, TcpReceive::Stale);
        assert_eq!(session.tcp_bytes_received(1, &[]).await, TcpReceive::Stale);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_idempotent() {
        let (mut session, mut rx) = test_session();

        session.subscribe();
        session.subscribe();
        assert!(session.is_notifying());

        session.unsubscribe();
        session.unsubscribe();
        assert!(!session.is_notifying());

        session.send_notification(b"x").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscription_independent_of_connection() {
        let (mut session, mut rx) = test_session();

        // Subscribed with no TCP peer: notification still delivered
        session.subscribe();
        session.send_notification(b"offline").await;
        assert_eq!(rx.try_recv().expect("Expected notification"), b"offline");
        assert_eq!(session.read(), Ok(b"offline".to_vec()));
    }
}
