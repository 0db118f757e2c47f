//! PoE bridge monitor
//!
//! Subscribes to everything under `ubnt24/poe/` and logs it. With
//! `--publish`, also sends a test command on a fixed period, e.g. to check
//! a running `poe-control` end to end:
//!
//! ```text
//! poe-monitor --broker emqx --publish ubnt24/poe/07 --payload 1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use poe_core::bus::{connect_with_retry, dispatch, Backoff, BusHandler, MessageBus, MqttBus, RetryPolicy};
use poe_core::{logging, BusError, MqttSettings, RetrySettings};
use rumqttc::QoS;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MONITOR_TOPIC: &str = "ubnt24/poe/#";

#[derive(Debug, Parser)]
#[command(version, about = "Monitor PoE bridge MQTT traffic")]
struct Args {
    #[arg(long, default_value = "emqx")]
    broker: String,

    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Topic to publish a test command on
    #[arg(long)]
    publish: Option<String>,

    #[arg(long, default_value = "1")]
    payload: String,

    /// Seconds between test commands
    #[arg(long, default_value_t = 5)]
    every: u64,
}

#[derive(Default)]
struct Monitor {
    received: u64,
}

impl BusHandler for Monitor {
    async fn on_connect<B: MessageBus>(&mut self, bus: &mut B) -> Result<(), BusError> {
        info!("Connected to MQTT broker successfully");
        bus.subscribe(MONITOR_TOPIC).await?;
        info!("Successfully subscribed to '{}'", MONITOR_TOPIC);
        Ok(())
    }

    async fn on_message<B: MessageBus>(&mut self, _bus: &mut B, topic: &str, payload: &[u8]) {
        self.received += 1;
        info!(
            "Received message on topic {}: {}",
            topic,
            String::from_utf8_lossy(payload)
        );
    }

    fn on_disconnect(&mut self, error: &BusError) {
        warn!("MQTT connection error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("debug");
    let args = Args::parse();

    let settings = MqttSettings {
        broker: args.broker.clone(),
        port: args.port,
        topic: None,
        client_id: None,
        keep_alive_secs: 30,
    };
    let retry = RetrySettings::default();

    let (mut bus, mut eventloop) = MqttBus::new(&settings, "poe-monitor");
    info!("Connecting to MQTT broker at {}:{}...", args.broker, args.port);
    connect_with_retry(&mut eventloop, &RetryPolicy::from(&retry))
        .await
        .context("Could not connect to MQTT broker")?;

    if let Some(topic) = args.publish.clone() {
        let client = bus.client().clone();
        let payload = args.payload.clone();
        let every = Duration::from_secs(args.every.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                info!("Sending message to {}: {}", topic, payload);
                if let Err(e) = client
                    .publish(topic.as_str(), QoS::AtLeastOnce, false, payload.clone())
                    .await
                {
                    error!("Publish failed: {}", e);
                }
            }
        });
    }

    let mut monitor = Monitor::default();
    let mut backoff = Backoff::from(&retry);
    tokio::select! {
        result = dispatch(&mut eventloop, &mut bus, &mut monitor, &mut backoff) => {
            result.context("MQTT dispatch failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    debug!("Saw {} messages", monitor.received);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poe_devkit::MockMqttClient;

    #[tokio::test]
    async fn test_monitor_subscribes_and_counts() {
        let client = MockMqttClient::new();
        client.simulate_incoming("ubnt24/poe/07", "1");
        client.simulate_incoming("ubnt24/poe/status", "{}");

        let mut source = client.clone();
        let mut bus = client.clone();
        let mut monitor = Monitor::default();
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(1));
        dispatch(&mut source, &mut bus, &mut monitor, &mut backoff).await.unwrap();

        assert_eq!(client.get_subscriptions(), [MONITOR_TOPIC]);
        assert_eq!(monitor.received, 2);
    }
}
