use crate::parser::PoeStatusRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One polling cycle for one switch, as published on the status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub server: String,
    /// Capture time in epoch seconds with sub-second precision
    pub timestamp: f64,
    pub poe_status: Vec<PoeStatusRecord>,
}

impl StatusReport {
    pub fn new(server: impl Into<String>, poe_status: Vec<PoeStatusRecord>) -> Self {
        Self::captured_at(server, Utc::now(), poe_status)
    }

    pub fn captured_at(
        server: impl Into<String>,
        at: DateTime<Utc>,
        poe_status: Vec<PoeStatusRecord>,
    ) -> Self {
        Self {
            server: server.into(),
            timestamp: at.timestamp_micros() as f64 / 1_000_000.0,
            poe_status,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
