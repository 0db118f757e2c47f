/*!
Test harness for the bridge orchestrators

Bundles a mock broker, a scripted switch and a config pointing at both,
plus JSON assertions on what got published.
*/

use crate::mqtt_stub::MockMqttClient;
use crate::shell_stub::MockSwitch;
use anyhow::Result;
use poe_core::BridgeConfig;
use serde_json::Value;

pub const STATUS_TOPIC: &str = "ubnt24/poe/status";

pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub switch: MockSwitch,
    pub config: BridgeConfig,
}

impl TestHarness {
    /// Harness with one target `sw1` polled with `show poe status all`
    pub fn new() -> Self {
        Self::with_hosts(&["sw1"])
    }

    pub fn with_hosts(hosts: &[&str]) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let servers: Vec<Value> = hosts
            .iter()
            .map(|host| {
                serde_json::json!({
                    "host": host,
                    "user": "admin",
                    "password": "ubnt",
                    "commands": ["show poe status all"]
                })
            })
            .collect();

        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "mqtt": {"broker": "emqx", "topic": STATUS_TOPIC},
            "servers": servers
        }))
        .expect("harness config is valid");

        Self {
            mqtt_client: MockMqttClient::new(),
            switch: MockSwitch::new(),
            config,
        }
    }

    pub fn with_switch(mut self, switch: MockSwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn assert_message_sent(&self, topic: &str, expected_payload: &Value) -> Result<()> {
        for msg in self.mqtt_client.find_messages_by_topic(topic) {
            let payload: Value = serde_json::from_slice(&msg.payload)?;
            if payload == *expected_payload {
                return Ok(());
            }
        }
        anyhow::bail!("Expected message not found on topic: {}", topic);
    }

    /// Assert a dotted field path of the last message on `topic` equals `expected`
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? else {
            anyhow::bail!("No message published on {}", topic);
        };
        match get_nested_field(&msg, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found in latest message on {}", field_path, topic),
        }
    }

    /// Every line typed into the switch, all sessions in order
    pub fn lines_sent(&self) -> Vec<String> {
        self.switch
            .sessions()
            .into_iter()
            .flat_map(|session| session.lines)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
