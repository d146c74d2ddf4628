//! Hostlink demo driver
//!
//! Brings up the transport against a simulated slave, pushes one frame
//! through every traffic class, bounces a probe off the test-interface
//! loopback and prints the link counters.
//!
//! An optional argument names a JSON file with `TransportConfig` overrides:
//!
//! ```text
//! hostlink-cli [config.json]
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hostlink_mux::{TransactionEngine, TransportConfig};
use hostlink_sim::{create_sim_slave, SlaveProfile};
use hostlink_wire::InterfaceType;

fn load_config() -> Result<TransportConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path))
        }
        None => Ok(TransportConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    info!(
        "starting transport: {} byte transfers, {} pending max",
        config.transfer_size, config.tx_pending_max
    );

    let (bus, slave) = create_sim_slave(SlaveProfile::default());
    let (engine, transport, mut events) = TransactionEngine::new(bus, config);
    slave.connect_irq(transport.irq_line());
    let engine_task = tokio::spawn(engine.run());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("link event: {:?}", event);
        }
    });

    let caps = transport.wait_ready().await?;
    info!("data path open, capabilities: {}", caps);

    // One frame per priority class
    transport.transmit(InterfaceType::Serial, 0, b"scan-request")?;
    transport.transmit_tagged(InterfaceType::HciBt, 0, 0x01, &[0x03, 0x0C, 0x00])?;
    transport.transmit(InterfaceType::Station, 0, &[0xAA; 64])?;

    // Bounce a probe off the slave's test-interface loopback
    transport.transmit(InterfaceType::Test, 0, b"loopback probe")?;
    let echo = tokio::time::timeout(Duration::from_secs(1), transport.recv())
        .await
        .context("no loopback reply")?;
    if let Some(frame) = echo {
        info!(
            "loopback reply: {} bytes on {} (seq {})",
            frame.payload.len(),
            frame.if_type.name(),
            frame.seq_num
        );
    }

    // Let the engine drain before reporting
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("slave saw {} host frames", slave.received().len());
    info!(
        "link stats: {}",
        serde_json::to_string(&transport.stats())?
    );

    transport.shutdown();
    let _ = engine_task.await;
    Ok(())
}
