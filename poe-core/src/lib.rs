//! PoE bridge core - shared pieces of the MQTT <-> switch CLI bridge
//!
//! - Configuration loading (JSON, read once at startup)
//! - Topic/payload mapping to switch interface commands
//! - Remote shell session driver (enable / configure / interface scripting)
//! - `show poe status` screen-scraping parser and status report
//! - MQTT plumbing: bounded connect retry, event dispatch with reconnect backoff

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod parser;
pub mod report;
pub mod session;

pub use config::{BridgeConfig, MqttSettings, RetrySettings, SessionSettings, Target};
pub use error::{BusError, ConfigError, Rejection, SessionError};
pub use mapper::{map_command, InterfaceId, PoeCommand, PoeRequest};
pub use parser::{parse_poe_status, PoeStatusRecord};
pub use report::StatusReport;
pub use session::{Completion, SessionDriver, SessionScript, ShellChannel, ShellConnector};
