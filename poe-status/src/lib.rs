//! PoE status publisher - status side
//!
//! For every configured switch: one session running all of its status
//! commands, one parse of the combined transcript, one JSON report on the
//! status topic. Targets are processed sequentially with a pause between
//! them; a failing switch is logged and skipped.

use poe_core::bus::MessageBus;
use poe_core::session::{SessionDriver, SessionScript, ShellConnector};
use poe_core::{parse_poe_status, BusError, SessionError, StatusReport, Target};
use tokio::time::sleep;
use tracing::{debug, error, info, warn, Instrument};

/// Result of one pass over all targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub published: usize,
    pub failed: usize,
}

pub struct StatusPoller<C> {
    driver: SessionDriver<C>,
    topic: String,
}

impl<C: ShellConnector> StatusPoller<C> {
    pub fn new(driver: SessionDriver<C>, topic: impl Into<String>) -> Self {
        Self {
            driver,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run the target's status commands and build its report.
    pub async fn poll_target(&self, target: &Target) -> Result<StatusReport, SessionError> {
        if target.commands.is_empty() {
            warn!("No status commands configured for {}", target.host);
            return Ok(StatusReport::new(&target.host, Vec::new()));
        }

        let script = SessionScript::privileged(target.commands.iter().cloned());
        let transcript = self.driver.run(target, &script).await?;
        debug!("Combined output:\n{}", transcript);

        let records = parse_poe_status(&transcript);
        info!("Parsed {} PoE port records from {}", records.len(), target.host);
        Ok(StatusReport::new(&target.host, records))
    }

    async fn publish<B: MessageBus>(&self, bus: &mut B, report: &StatusReport) -> Result<(), BusError> {
        let message = report.to_json()?;
        bus.publish(&self.topic, message.into_bytes()).await?;
        info!("Published status of {} to '{}'", report.server, self.topic);
        Ok(())
    }

    /// Poll and publish every target once.
    pub async fn run_cycle<B: MessageBus>(&self, targets: &[Target], bus: &mut B) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                sleep(self.driver.settings().target_gap()).await;
            }

            let span = tracing::info_span!("target", host = %target.host);
            let published = async {
                info!("Processing server: {}", target.host);
                match self.poll_target(target).await {
                    Ok(report) => match self.publish(bus, &report).await {
                        Ok(()) => true,
                        Err(e) => {
                            error!("Error publishing to MQTT: {}", e);
                            false
                        }
                    },
                    Err(e) => {
                        error!("Failed to read PoE status: {}", e);
                        false
                    }
                }
            }
            .instrument(span)
            .await;

            if published {
                summary.published += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }
}
