//! PoE control bridge binary
//!
//! ```text
//! poe-control --config poe_control_config.json
//! mosquitto_pub -h emqx -t ubnt24/poe/07 -m 0   # power off port 0/7
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use poe_control::{ControlBridge, COMMAND_TOPIC};
use poe_core::bus::{connect_with_retry, dispatch, Backoff, MqttBus, RetryPolicy};
use poe_core::session::{SessionDriver, SshConnector};
use poe_core::{logging, BridgeConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "Toggle switch PoE ports from MQTT")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "POE_BRIDGE_CONFIG", default_value = "poe_control_config.json")]
    config: PathBuf,

    /// Topic filter to subscribe to
    #[arg(long, default_value = COMMAND_TOPIC)]
    topic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let args = Args::parse();

    info!("🔌 PoE control bridge starting...");

    let config = BridgeConfig::load(&args.config)
        .await
        .context("Failed to load configuration")?;
    let target = config.primary_target()?.clone();
    info!("Driving switch {} as '{}'", target.host, target.user);

    let (mut bus, mut eventloop) = MqttBus::new(&config.mqtt, "poe-control");
    info!(
        "Connecting to MQTT broker at {}:{}...",
        config.mqtt.broker, config.mqtt.port
    );
    connect_with_retry(&mut eventloop, &RetryPolicy::from(&config.retry))
        .await
        .context("Could not connect to MQTT broker")?;

    let driver = SessionDriver::new(SshConnector::default(), config.session.clone());
    let mut bridge = ControlBridge::new(driver, target).with_topic(args.topic);
    let mut backoff = Backoff::from(&config.retry);

    tokio::select! {
        result = dispatch(&mut eventloop, &mut bus, &mut bridge, &mut backoff) => {
            result.context("MQTT dispatch failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    let stats = bridge.stats();
    info!(
        "Bridge stopped ({} applied, {} rejected, {} failed)",
        stats.applied, stats.rejected, stats.failed
    );
    Ok(())
}
