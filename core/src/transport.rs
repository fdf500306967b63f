/// Transport-adapter boundary
///
/// The relay core never talks to BlueZ directly. The platform side
/// feeds inbound events (writes, subscribe/unsubscribe, pull-reads)
/// through a [`RelayHandle`](crate::bridge::RelayHandle) and receives
/// outbound pushes through the [`Notifier`] trait below. This mirrors
/// how platform-specific code drives the protocol-level BLE
/// abstractions: the core stays testable without Bluetooth hardware.
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// PWS service UUID
pub const PWS_SERVICE_UUID: u128 = 0x9FA480E0_4967_4542_9390_D343DC5D04AE;

/// PWS characteristic UUID (write + notify + read)
pub const PWS_CHARACTERISTIC_UUID: u128 = 0xAF0BADB1_5B99_43CD_917A_A77BC549E3CC;

/// Outbound primitive of the transport-adapter boundary.
///
/// Invoked by the relay session for every notification while a
/// wireless peer is subscribed. The payload is the raw bytes read
/// from the TCP peer; the 256-byte framing applies to the TCP side
/// only, never here.
#[async_trait]
pub trait Notifier: Send + 'static {
    async fn notify(&mut self, payload: &[u8]);
}

/// Notifier that forwards payloads into an mpsc channel.
///
/// Used by the integration tests and by embedders that consume
/// notifications programmatically instead of pushing them over a
/// platform notify session.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelNotifier {
    /// Create a notifier together with the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&mut self, payload: &[u8]) {
        if self.tx.send(payload.to_vec()).is_err() {
            debug!("notification receiver dropped, discarding payload");
        }
    }
}
