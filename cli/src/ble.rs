/// BlueZ surface: LE advertisement + the PWS GATT application
///
/// Maps the BlueZ characteristic callbacks onto the relay boundary:
/// writes feed the bridge, notify sessions drive the subscription
/// flag, and pull-reads return the last notified value. Everything
/// protocol-shaped stays in pwsbridge-core; this module is plumbing.
use anyhow::{Context, Result};
use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle, Type};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicNotifier, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, ReqError, Service,
};
use bluer::Uuid;
use pwsbridge_core::{
    advertising, BridgeError, Notifier, RelayHandle, PWS_CHARACTERISTIC_UUID, PWS_SERVICE_UUID,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared slot holding the active notify session, if any
pub type NotifySlot = Arc<Mutex<Option<CharacteristicNotifier>>>;

/// Pushes relay notifications out through the active notify session.
///
/// When no wireless peer is subscribed (or the session died under us)
/// the payload is dropped, matching the relay's fail-soft policy.
pub struct BleNotifier {
    slot: NotifySlot,
}

impl BleNotifier {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// The slot the GATT notify callback installs sessions into
    pub fn slot(&self) -> NotifySlot {
        self.slot.clone()
    }
}

impl Default for BleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BleNotifier {
    async fn notify(&mut self, payload: &[u8]) {
        let mut slot = self.slot.lock().await;
        match slot.as_mut() {
            Some(notifier) => {
                debug!(data = %hex::encode(payload), "pushing notification over BLE");
                if let Err(err) = notifier.notify(payload.to_vec()).await {
                    warn!(%err, "notify session gone, dropping payload");
                    *slot = None;
                }
            }
            None => debug!("no notify session, dropping payload"),
        }
    }
}

/// Keeps the advertisement and GATT application registered while held
pub struct BleSurface {
    _adv: AdvertisementHandle,
    _app: ApplicationHandle,
}

/// Bring up the whole BLE side: adapter lookup, Nearby Action
/// advertisement and the PWS GATT application.
///
/// A missing named adapter is a fatal startup error.
pub async fn serve(
    adapter_name: &str,
    ssid: &str,
    contact: &str,
    handle: RelayHandle,
    slot: NotifySlot,
) -> Result<BleSurface> {
    let session = bluer::Session::new()
        .await
        .context("Failed to connect to bluetoothd")?;
    let adapter = if adapter_name.is_empty() {
        session
            .default_adapter()
            .await
            .context("No Bluetooth adapter present")?
    } else {
        session
            .adapter(adapter_name)
            .with_context(|| format!("Bluetooth adapter {adapter_name} not found"))?
    };
    adapter
        .set_powered(true)
        .await
        .context("Failed to power on adapter")?;
    info!(adapter = %adapter.name(), "using Bluetooth adapter");

    let payload = advertising::nearby_action_payload(contact, ssid);
    let advertisement = Advertisement {
        advertisement_type: Type::Peripheral,
        manufacturer_data: BTreeMap::from([(advertising::APPLE_COMPANY_ID, payload.to_vec())]),
        discoverable: Some(true),
        ..Default::default()
    };
    let adv_handle = adapter
        .advertise(advertisement)
        .await
        .context("Failed to register LE advertisement")?;
    info!(payload = %hex::encode(payload), "advertising Nearby Action payload");

    let application = Application {
        services: vec![Service {
            uuid: Uuid::from_u128(PWS_SERVICE_UUID),
            primary: true,
            characteristics: vec![pws_characteristic(handle, slot)],
            ..Default::default()
        }],
        ..Default::default()
    };
    let app_handle = adapter
        .serve_gatt_application(application)
        .await
        .context("Failed to register GATT application")?;

    Ok(BleSurface {
        _adv: adv_handle,
        _app: app_handle,
    })
}

fn pws_characteristic(handle: RelayHandle, slot: NotifySlot) -> Characteristic {
    let write_handle = handle.clone();
    let read_handle = handle.clone();
    Characteristic {
        uuid: Uuid::from_u128(PWS_CHARACTERISTIC_UUID),
        write: Some(CharacteristicWrite {
            write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                let handle = write_handle.clone();
                Box::pin(async move {
                    debug!(data = %hex::encode(&value), "GATT write received");
                    handle
                        .write_received(value)
                        .await
                        .map_err(|_| ReqError::Failed)?;
                    Ok(())
                })
            })),
            ..Default::default()
        }),
        read: Some(CharacteristicRead {
            read: true,
            fun: Box::new(move |_req| {
                let handle = read_handle.clone();
                Box::pin(async move {
                    handle.read().await.map_err(|err| match err {
                        // Pull-read before anything was ever notified
                        BridgeError::Read(_) => ReqError::NotSupported,
                        _ => ReqError::Failed,
                    })
                })
            }),
            ..Default::default()
        }),
        notify: Some(CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                let handle = handle.clone();
                let slot = slot.clone();
                Box::pin(async move {
                    info!("notify session started");
                    let _ = handle.subscribe().await;
                    *slot.lock().await = Some(notifier);
                    tokio::spawn(watch_notify_stop(handle, slot));
                })
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Clears the subscription once BlueZ tears the notify session down.
///
/// bluer only surfaces the stop through `is_stopped`, so poll it.
async fn watch_notify_stop(handle: RelayHandle, slot: NotifySlot) {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut guard = slot.lock().await;
        let stopped = matches!(guard.as_ref(), Some(n) if n.is_stopped());
        if stopped {
            info!("notify session stopped");
            *guard = None;
        } else if guard.is_some() {
            // Still live: keep watching
            continue;
        }
        // Stopped here or cleared elsewhere (notify failure or
        // replacement): drop the subscription either way.
        drop(guard);
        let _ = handle.unsubscribe().await;
        break;
    }
}
