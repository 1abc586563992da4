//! Example: Keep-alive and Subscription Lifecycle
//!
//! This example drives a connection against the mock transport and prints
//! every link event: the probe starting, being suspended by a subscription,
//! resuming, and the final teardown with one failing characteristic.
//!
//! Run with: `RUST_LOG=debug cargo run --example keepalive -- [CONFIG.toml]`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use gattlink_core::{Connection, DispatchQueue, LinkConfig, MockTransport};
use gattlink_types::CharacteristicProperties;
use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_NAME, GAP_SERVICE};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Optional config file from command line
    let config = match env::args().nth(1) {
        Some(path) => LinkConfig::load_validated(path)?,
        None => LinkConfig::fast()
            .probe_interval(Duration::from_secs(1))
            .probe_timeout(Duration::from_millis(500)),
    };

    let transport = Arc::new(
        MockTransport::builder()
            .service(GAP_SERVICE)
            .service(BATTERY_SERVICE)
            .characteristic(GAP_SERVICE, DEVICE_NAME, CharacteristicProperties::notify_only())
            .characteristic(
                BATTERY_SERVICE,
                BATTERY_LEVEL,
                CharacteristicProperties::notify_only(),
            )
            .latency(Duration::from_millis(30))
            .build(),
    );
    let connection = Connection::new(
        transport.clone(),
        Arc::new(DispatchQueue::spawn("descriptor-writes")),
        config,
    )?;

    // Print events as they happen
    let mut events = connection.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    println!("Connecting...");
    connection.connect().await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    println!("State: {:?}", connection.state().await);
    println!();

    println!("Discovering characteristics...");
    let name = connection
        .service(GAP_SERVICE)
        .await?
        .characteristic(DEVICE_NAME)
        .await?;
    let level = connection
        .service(BATTERY_SERVICE)
        .await?
        .characteristic(BATTERY_LEVEL)
        .await?;
    name.enable_notifications().await?;
    level.enable_notifications().await?;
    println!(
        "State: {:?} ({} subscribers)",
        connection.state().await,
        connection.keep_alive().subscriber_count().await
    );
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    println!();

    println!("Disabling {}...", name.id());
    name.disable_notifications().await?;
    println!("State: {:?}", connection.state().await);
    println!();

    // Make the remaining subscription refuse its disable write
    transport.fail_writes_for(level.id()).await;
    println!("Disconnecting...");
    let report = connection.disconnect().await;
    println!("Teardown: {report:?}");
    println!("State: {:?}", connection.state().await);
    println!();

    let summary = connection.metrics().summary();
    println!("Probes:            {}", summary.probes.count);
    println!("Descriptor writes: {}", summary.descriptor_writes.count);
    println!("Discoveries:       {}", summary.discoveries.count);

    Ok(())
}
