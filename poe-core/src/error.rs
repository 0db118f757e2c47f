//! Typed errors, one enum per component, so callers can decide between
//! log-and-continue and fatal without catch-all handling.

use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Inbound message that does not map to a switch command. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("topic '{topic}' does not end with a port number")]
    InvalidPort { topic: String },

    #[error("payload '{payload}' is not a PoE command (expected \"0\" or \"1\")")]
    InvalidPayload { payload: String },
}

/// Failure during a scripted exchange with the switch. The single message or
/// polling cycle is abandoned; the process keeps running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot reach {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("authentication rejected by {host} for user '{user}'")]
    AuthFailed { host: String, user: String },

    #[error("shell channel error: {0}")]
    Channel(String),

    #[error("I/O error on shell session: {0}")]
    Io(#[from] std::io::Error),
}

impl From<russh::Error> for SessionError {
    fn from(e: russh::Error) -> Self {
        SessionError::Channel(e.to_string())
    }
}

/// Message bus failure.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("gave up connecting to broker after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<BusError> },

    #[error("cannot serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
