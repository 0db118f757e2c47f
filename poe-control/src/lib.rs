//! PoE control bridge - command side
//!
//! Subscribes to `ubnt24/poe/+` and turns each message into one scripted
//! switch session: topic `ubnt24/poe/07` + payload `0` runs
//! `poe opmode shutdown` on interface `0/7`.
//!
//! Messages are handled one at a time in arrival order. A rejected message
//! or a failed session is logged and never stops the bridge.

use poe_core::bus::{BusHandler, MessageBus};
use poe_core::session::{SessionDriver, SessionScript, ShellConnector};
use poe_core::{map_command, BusError, Target};
use tracing::{debug, error, info, warn, Instrument};

/// One level below `ubnt24/poe`, one port per topic
pub const COMMAND_TOPIC: &str = "ubnt24/poe/+";

/// Outcome counters, for logs and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub applied: u64,
    pub rejected: u64,
    pub failed: u64,
}

pub struct ControlBridge<C> {
    driver: SessionDriver<C>,
    target: Target,
    topic_filter: String,
    stats: ControlStats,
}

impl<C: ShellConnector> ControlBridge<C> {
    pub fn new(driver: SessionDriver<C>, target: Target) -> Self {
        Self {
            driver,
            target,
            topic_filter: COMMAND_TOPIC.to_string(),
            stats: ControlStats::default(),
        }
    }

    pub fn with_topic(mut self, topic_filter: impl Into<String>) -> Self {
        self.topic_filter = topic_filter.into();
        self
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }

    async fn handle(&mut self, topic: &str, payload: &[u8]) {
        let request = match map_command(topic, payload) {
            Ok(request) => request,
            Err(rejection) => {
                warn!("Invalid command received: {}", rejection);
                self.stats.rejected += 1;
                return;
            }
        };

        info!(
            "Received command {:?} for interface {}",
            request.command, request.interface
        );
        let script = SessionScript::interface(request.interface, request.command.cli());

        match self.driver.run(&self.target, &script).await {
            Ok(output) => {
                debug!("Switch replied: {:?}", output);
                info!("Applied '{}' on {}", request.command.cli(), request.interface);
                self.stats.applied += 1;
            }
            Err(e) => {
                error!("Error processing message: {}", e);
                self.stats.failed += 1;
            }
        }
    }
}

impl<C: ShellConnector> BusHandler for ControlBridge<C> {
    async fn on_connect<B: MessageBus>(&mut self, bus: &mut B) -> Result<(), BusError> {
        bus.subscribe(&self.topic_filter).await?;
        info!("Subscribed to '{}'", self.topic_filter);
        Ok(())
    }

    async fn on_message<B: MessageBus>(&mut self, _bus: &mut B, topic: &str, payload: &[u8]) {
        let span = tracing::info_span!("message", topic = %topic);
        self.handle(topic, payload).instrument(span).await
    }

    fn on_disconnect(&mut self, error: &BusError) {
        warn!("Lost connection to MQTT broker: {}", error);
    }
}
