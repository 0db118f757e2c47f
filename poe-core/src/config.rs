//! Bridge configuration
//!
//! Loaded once at startup from a JSON file and passed by reference to every
//! component that needs it. Only `mqtt.broker` and `servers` are required;
//! everything else has defaults matching the historical scripts.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub mqtt: MqttSettings,
    pub servers: Vec<Target>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Status report topic; only the status side needs it.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// A switch endpoint. Identity is the host.
#[derive(Clone, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Secret for `enable`; the login password is reused when absent.
    #[serde(default)]
    pub enable_password: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Target {
    pub fn enable_secret(&self) -> &str {
        self.enable_password.as_deref().unwrap_or(&self.password)
    }
}

// Never print secrets, config gets logged at debug level
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("enable_password", &self.enable_password.as_ref().map(|_| "***"))
            .field("commands", &self.commands)
            .finish()
    }
}

/// Pacing and buffer sizes for the scripted shell exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub step_delay_ms: u64,
    pub command_delay_ms: u64,
    pub banner_buffer: usize,
    pub command_output_buffer: usize,
    pub status_output_buffer: usize,
    /// Pause between status commands inside one session.
    pub command_gap_ms: u64,
    /// Pause between two targets of a status cycle.
    pub target_gap_ms: u64,
    pub completion: CompletionSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            step_delay_ms: 100,
            command_delay_ms: 300,
            banner_buffer: 1000,
            command_output_buffer: 1000,
            status_output_buffer: 4096,
            command_gap_ms: 500,
            target_gap_ms: 1000,
            completion: CompletionSettings::FixedDelay,
        }
    }
}

impl SessionSettings {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn command_gap(&self) -> Duration {
        Duration::from_millis(self.command_gap_ms)
    }

    pub fn target_gap(&self) -> Duration {
        Duration::from_millis(self.target_gap_ms)
    }
}

/// How the driver decides a command has finished printing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompletionSettings {
    FixedDelay,
    /// Read until the output ends with a prompt marker or goes idle.
    /// Prompt strings are firmware specific, so this is opt-in.
    Prompt {
        #[serde(default = "default_prompt_markers")]
        markers: Vec<String>,
        #[serde(default = "default_idle_timeout")]
        idle_timeout_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_secs: u64,
    pub reconnect_min_secs: u64,
    pub reconnect_max_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_secs: 5,
            reconnect_min_secs: 1,
            reconnect_max_secs: 60,
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

fn default_ssh_port() -> u16 {
    22
}

fn default_prompt_markers() -> Vec<String> {
    vec!["#".to_string(), ">".to_string()]
}

fn default_idle_timeout() -> u64 {
    2000
}

impl BridgeConfig {
    /// Load and validate the config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: BridgeConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker is empty".into()));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid("mqtt.keep_alive_secs must be at least 5".into()));
        }
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("no servers configured".into()));
        }
        if let Some(idx) = self.servers.iter().position(|s| s.host.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("servers[{idx}].host is empty")));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// The switch the command side drives. Validation guarantees one exists.
    pub fn primary_target(&self) -> Result<&Target, ConfigError> {
        self.servers
            .first()
            .ok_or_else(|| ConfigError::Invalid("no servers configured".into()))
    }

    pub fn status_topic(&self) -> Result<&str, ConfigError> {
        self.mqtt
            .topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("mqtt.topic is required for status reports".into()))
    }
}
