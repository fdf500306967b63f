// pwsbridge-core — Wi-Fi Password Sharing GATT↔TCP relay core
//
// Bridges a single write/notify characteristic to a local TCP peer:
// wireless writes are frame-encoded and forwarded to the attached TCP
// client, bytes from the TCP client flow back as raw notification
// payloads. The platform BLE plumbing lives outside this crate; the
// boundary is the [`transport::Notifier`] trait on the way out and
// the [`bridge::RelayHandle`] on the way in, which keeps everything
// here testable without Bluetooth hardware.
//
// Modules:
//
// - **frame**: fixed 256-byte frame codec used on the TCP side only
// - **session**: one TCP connection + subscription flag + last value
// - **bridge**: TCP listener and the single-task event loop
// - **transport**: adapter boundary trait and service/characteristic UUIDs
// - **advertising**: Nearby Action payload with hashed identity fields

pub mod advertising;
pub mod bridge;
pub mod frame;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use bridge::{BridgeError, RelayBridge, RelayConfig, RelayHandle};
pub use frame::{decode, encode, FrameError, FRAME_LEN, MAX_PAYLOAD_LEN};
pub use session::{ConnectionState, ReadError, RelaySession, TcpReceive};
pub use transport::{ChannelNotifier, Notifier, PWS_CHARACTERISTIC_UUID, PWS_SERVICE_UUID};
