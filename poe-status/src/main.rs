//! PoE status publisher binary
//!
//! Runs one polling cycle and exits, for cron / systemd timers. With
//! `--interval` it keeps polling on its own.

use anyhow::{Context, Result};
use clap::Parser;
use poe_core::bus::{connect_with_retry, ConfirmedBus, MessageBus, RetryPolicy};
use poe_core::session::{SessionDriver, SshConnector};
use poe_core::{logging, BridgeConfig, BusError};
use poe_status::{CycleSummary, StatusPoller};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Publish switch PoE status to MQTT")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "POE_BRIDGE_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Poll every N seconds instead of running once
    #[arg(long)]
    interval: Option<u64>,

    /// Print reports on stdout instead of publishing them
    #[arg(long)]
    dry_run: bool,
}

/// Prints what would have been published.
struct StdoutBus;

impl MessageBus for StdoutBus {
    async fn subscribe(&mut self, _topic: &str) -> Result<(), BusError> {
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        println!("{}: {}", topic, String::from_utf8_lossy(&payload));
        Ok(())
    }
}

async fn cycle(
    poller: &StatusPoller<SshConnector>,
    config: &BridgeConfig,
    dry_run: bool,
) -> Result<CycleSummary> {
    if dry_run {
        return Ok(poller.run_cycle(&config.servers, &mut StdoutBus).await);
    }

    let mut bus = ConfirmedBus::new(&config.mqtt, "poe-status");
    info!(
        "Connecting to MQTT broker at {}:{}...",
        config.mqtt.broker, config.mqtt.port
    );
    connect_with_retry(&mut bus, &RetryPolicy::from(&config.retry))
        .await
        .context("Could not connect to MQTT broker")?;

    let summary = poller.run_cycle(&config.servers, &mut bus).await;

    if let Err(e) = bus.disconnect().await {
        error!("Failed to disconnect from MQTT broker: {}", e);
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let args = Args::parse();

    info!("📊 PoE status publisher starting...");

    let config = BridgeConfig::load(&args.config)
        .await
        .context("Failed to load configuration")?;
    let topic = config.status_topic()?.to_string();

    let driver = SessionDriver::new(SshConnector::default(), config.session.clone());
    let poller = StatusPoller::new(driver, topic);

    let Some(period) = args.interval else {
        let summary = cycle(&poller, &config, args.dry_run).await?;
        info!(
            "Done: {} reports published, {} targets failed",
            summary.published, summary.failed
        );
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(period.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match cycle(&poller, &config, args.dry_run).await {
                    Ok(summary) => info!(
                        "Cycle done: {} reports published, {} targets failed",
                        summary.published, summary.failed
                    ),
                    Err(e) => error!("Polling cycle failed: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                return Ok(());
            }
        }
    }
}
