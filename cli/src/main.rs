// pwsbridge — Wi-Fi Password Sharing GATT↔TCP relay
//
// Advertises a Nearby Action payload over BlueZ, exposes the PWS
// characteristic, and bridges it to a local TCP peer on port 8080.

mod ble;

use anyhow::{Context, Result};
use clap::Parser;
use pwsbridge_core::{RelayBridge, RelayConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "pwsbridge")]
#[command(about = "Wi-Fi Password Sharing GATT to TCP relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Bluetooth adapter name (default adapter when omitted)
    #[arg(short, long, default_value = "")]
    adapter_name: String,
    /// SSID of the network being shared
    #[arg(short, long)]
    ssid: String,
    /// Email address or phone number of the sharing contact
    #[arg(short, long)]
    contact: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let notifier = ble::BleNotifier::new();
    let notify_slot = notifier.slot();

    // Bind the TCP side first: a port conflict should fail before we
    // touch the Bluetooth stack.
    let bridge = RelayBridge::bind(RelayConfig::default(), notifier)
        .await
        .context("Failed to start TCP relay")?;
    let handle = bridge.handle();

    let _surface = ble::serve(
        &cli.adapter_name,
        &cli.ssid,
        &cli.contact,
        handle.clone(),
        notify_slot,
    )
    .await
    .context("Failed to bring up the BLE surface")?;

    let bridge_task = tokio::spawn(bridge.run());

    info!("pwsbridge running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;

    handle.shutdown().await;
    bridge_task.await.context("Relay bridge task failed")?;
    Ok(())
}
