/*!
Mock MQTT client for development without a broker

Records every publish/subscribe and replays simulated inbound traffic
through [`EventSource`], so a [`poe_core::bus::dispatch`] loop can run
against it and stops once the simulated traffic is exhausted.
*/

use poe_core::bus::{BusEvent, EventSource, MessageBus};
use poe_core::BusError;
use rumqttc::QoS;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Default)]
struct Inner {
    published: Vec<MockMessage>,
    subscriptions: Vec<String>,
    inbound: VecDeque<Result<BusEvent, BusError>>,
    fail_publish: bool,
}

/// Clones share state: hand one clone to the code under test as the bus and
/// keep another for assertions.
#[derive(Clone, Default)]
pub struct MockMqttClient {
    inner: Arc<Mutex<Inner>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an inbound publish
    pub fn simulate_incoming(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let topic = topic.into();
        tracing::info!("[MOCK] Simulated incoming: {}", topic);
        self.inner().inbound.push_back(Ok(BusEvent::Message {
            topic,
            payload: payload.into(),
        }));
    }

    /// Queue a dropped connection
    pub fn simulate_disconnect(&self) {
        let error = BusError::Connection(rumqttc::ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "simulated broker drop",
        )));
        self.inner().inbound.push_back(Err(error));
    }

    /// Queue a ConnAck, as seen after an automatic reconnection
    pub fn simulate_reconnect(&self) {
        self.inner().inbound.push_back(Ok(BusEvent::Connected));
    }

    /// Make every following publish fail
    pub fn fail_publishes(&self, fail: bool) {
        self.inner().fail_publish = fail;
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.inner().published.clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.inner().subscriptions.clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.inner()
            .published
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse the last message of a topic as JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> anyhow::Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }
}

impl MessageBus for MockMqttClient {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        tracing::info!("[MOCK] Subscribed to {}", topic);
        self.inner().subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut inner = self.inner();
        if inner.fail_publish {
            return Err(BusError::Connection(rumqttc::ConnectionError::RequestsDone));
        }
        tracing::info!("[MOCK] Published to {}: {} bytes", topic, payload.len());
        inner.published.push(MockMessage {
            topic: topic.to_string(),
            payload,
            qos: QoS::AtLeastOnce,
            retain: false,
        });
        Ok(())
    }
}

impl EventSource for MockMqttClient {
    async fn next_event(&mut self) -> Result<Option<BusEvent>, BusError> {
        self.inner().inbound.pop_front().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_publish_subscribe() {
        let mut client = MockMqttClient::new();

        client.subscribe("ubnt24/poe/+").await.unwrap();
        assert_eq!(client.get_subscriptions(), vec!["ubnt24/poe/+"]);

        client.publish("ubnt24/poe/status", b"{}".to_vec()).await.unwrap();
        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "ubnt24/poe/status");
        assert_eq!(messages[0].payload, b"{}");
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let mut client = MockMqttClient::new();
        let payload = serde_json::to_vec(&serde_json::json!({"server": "sw1"})).unwrap();
        client.publish("json/topic", payload).await.unwrap();

        let parsed: Option<serde_json::Value> = client.get_last_json_message("json/topic").unwrap();
        assert_eq!(parsed.unwrap()["server"], "sw1");
    }

    #[tokio::test]
    async fn test_inbound_replay_then_end() {
        let mut client = MockMqttClient::new();
        client.simulate_incoming("ubnt24/poe/3", "1");
        client.simulate_disconnect();
        client.simulate_reconnect();

        assert!(matches!(client.next_event().await, Ok(Some(BusEvent::Message { .. }))));
        assert!(client.next_event().await.is_err());
        assert_eq!(client.next_event().await.unwrap(), Some(BusEvent::Connected));
        assert_eq!(client.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failing_publish() {
        let mut client = MockMqttClient::new();
        client.fail_publishes(true);
        assert!(client.publish("t", Vec::new()).await.is_err());
        assert!(client.get_published_messages().is_empty());
    }
}
