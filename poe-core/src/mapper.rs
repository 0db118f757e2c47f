//! Topic + payload -> (interface, switch command)
//!
//! `ubnt24/poe/07` with payload `1` becomes `interface 0/7` + `poe opmode auto`.

use crate::error::Rejection;
use std::fmt;

/// Switch port address in `<unit>/<port>` form. Unit is always 0 on this switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceId {
    pub unit: u32,
    pub port: u64,
}

impl InterfaceId {
    pub fn port(port: u64) -> Self {
        Self { unit: 0, port }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoeCommand {
    /// Cut power to the port
    Shutdown,
    /// Power on / let the port negotiate
    Auto,
}

impl PoeCommand {
    pub fn from_payload(payload: &str) -> Result<Self, Rejection> {
        match payload.trim() {
            "0" => Ok(PoeCommand::Shutdown),
            "1" => Ok(PoeCommand::Auto),
            other => Err(Rejection::InvalidPayload {
                payload: other.to_string(),
            }),
        }
    }

    pub fn cli(&self) -> &'static str {
        match self {
            PoeCommand::Shutdown => "poe opmode shutdown",
            PoeCommand::Auto => "poe opmode auto",
        }
    }
}

/// An accepted inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoeRequest {
    pub interface: InterfaceId,
    pub command: PoeCommand,
}

pub fn interface_from_topic(topic: &str) -> Result<InterfaceId, Rejection> {
    let segment = topic.rsplit('/').next().unwrap_or(topic);
    segment
        .trim()
        .parse::<u64>()
        .map(InterfaceId::port)
        .map_err(|_| Rejection::InvalidPort {
            topic: topic.to_string(),
        })
}

/// Map an inbound message, rejecting anything that is not a valid port toggle.
pub fn map_command(topic: &str, payload: &[u8]) -> Result<PoeRequest, Rejection> {
    let interface = interface_from_topic(topic)?;
    let payload = std::str::from_utf8(payload).map_err(|_| Rejection::InvalidPayload {
        payload: String::from_utf8_lossy(payload).into_owned(),
    })?;
    let command = PoeCommand::from_payload(payload)?;
    Ok(PoeRequest { interface, command })
}
