//! MQTT plumbing
//!
//! - [`MessageBus`]: publish / subscribe, implemented over rumqttc
//! - [`EventSource`]: inbound events, implemented over the rumqttc event loop
//! - [`connect_with_retry`]: bounded first connection
//! - [`dispatch`]: single-task event loop calling a [`BusHandler`], with
//!   exponential backoff between reconnection attempts

use crate::config::{MqttSettings, RetrySettings};
use crate::error::BusError;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Requests queued per client before publish/subscribe calls push back.
const CLIENT_CAPACITY: usize = 10;

pub trait MessageBus: Send {
    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<(), BusError>> + Send;

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), BusError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    /// Pings, acks and other protocol traffic
    Other,
}

pub trait EventSource {
    /// Next event; `Ok(None)` once the client disconnected on purpose.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<BusEvent>, BusError>>;
}

/// Callbacks invoked in order by [`dispatch`]; a slow handler holds back
/// every later message.
pub trait BusHandler {
    fn on_connect<B: MessageBus>(&mut self, bus: &mut B) -> impl Future<Output = Result<(), BusError>>;

    fn on_message<B: MessageBus>(
        &mut self,
        bus: &mut B,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = ()>;

    fn on_disconnect(&mut self, error: &BusError);
}

pub fn mqtt_options(settings: &MqttSettings, program: &str) -> MqttOptions {
    let client_id = settings
        .client_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", program, uuid::Uuid::new_v4()));

    let mut options = MqttOptions::new(client_id, &settings.broker, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_clean_session(true);
    options
}

/// Fire-and-forget client: requests are queued and flushed by whoever
/// drives the event loop, so it is safe to use from inside [`dispatch`].
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub fn new(settings: &MqttSettings, program: &str) -> (Self, EventLoop) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(settings, program), CLIENT_CAPACITY);
        (Self { client }, eventloop)
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

impl MessageBus for MqttBus {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        self.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client.try_publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

impl EventSource for EventLoop {
    async fn next_event(&mut self) -> Result<Option<BusEvent>, BusError> {
        let event = match self.poll().await? {
            Event::Incoming(Incoming::ConnAck(_)) => BusEvent::Connected,
            Event::Incoming(Incoming::Publish(p)) => BusEvent::Message {
                topic: p.topic,
                payload: p.payload.to_vec(),
            },
            Event::Outgoing(Outgoing::Disconnect) => return Ok(None),
            _ => BusEvent::Other,
        };
        Ok(Some(event))
    }
}

/// Client that owns its event loop and waits for the broker acknowledgement
/// of every request. For short-lived publishers with no dispatch loop.
pub struct ConfirmedBus {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl ConfirmedBus {
    pub fn new(settings: &MqttSettings, program: &str) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(settings, program), CLIENT_CAPACITY);
        Self { client, eventloop }
    }

    async fn wait_for(&mut self, what: &str, mut done: impl FnMut(&Incoming) -> bool) -> Result<(), BusError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(incoming) if done(&incoming) => {
                    debug!("Broker acknowledged {}", what);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    pub async fn disconnect(&mut self) -> Result<(), BusError> {
        self.client.disconnect().await?;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => return Ok(()),
                Ok(_) => {}
            }
        }
    }
}

impl MessageBus for ConfirmedBus {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        self.wait_for("subscribe", |i| matches!(i, Incoming::SubAck(_))).await
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client.publish(topic, QoS::AtLeastOnce, false, payload).await?;
        self.wait_for("publish", |i| matches!(i, Incoming::PubAck(_))).await
    }
}

impl EventSource for ConfirmedBus {
    async fn next_event(&mut self) -> Result<Option<BusEvent>, BusError> {
        self.eventloop.next_event().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            attempts: settings.attempts.max(1),
            delay: Duration::from_secs(settings.delay_secs),
        }
    }
}

/// Poll until the broker accepts the connection.
pub async fn wait_connected<S: EventSource>(source: &mut S) -> Result<(), BusError> {
    loop {
        match source.next_event().await? {
            Some(BusEvent::Connected) => return Ok(()),
            Some(_) => {}
            None => {
                return Err(BusError::Connection(rumqttc::ConnectionError::RequestsDone));
            }
        }
    }
}

/// Establish the first connection, at most `policy.attempts` tries spaced
/// by `policy.delay`. Returns the number of attempts used.
pub async fn connect_with_retry<S: EventSource>(source: &mut S, policy: &RetryPolicy) -> Result<u32, BusError> {
    let mut attempt = 1;
    loop {
        match wait_connected(source).await {
            Ok(()) => {
                info!("Connected to MQTT broker (attempt {}/{})", attempt, policy.attempts);
                return Ok(attempt);
            }
            Err(e) if attempt >= policy.attempts => {
                error!("Giving up on MQTT broker after {} attempts: {}", attempt, e);
                return Err(BusError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    "MQTT connection attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, policy.attempts, e, policy.delay
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential reconnect delay, doubling from `min` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self { min, max, current: min }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

impl From<&RetrySettings> for Backoff {
    fn from(settings: &RetrySettings) -> Self {
        Backoff::new(
            Duration::from_secs(settings.reconnect_min_secs),
            Duration::from_secs(settings.reconnect_max_secs),
        )
    }
}

/// Drive `handler` from `source` until the client disconnects on purpose.
///
/// Expects the connection to be up already (see [`connect_with_retry`]):
/// `on_connect` runs once immediately and again after every reconnection.
/// Connection errors never end the loop.
pub async fn dispatch<S, B, H>(
    source: &mut S,
    bus: &mut B,
    handler: &mut H,
    backoff: &mut Backoff,
) -> Result<(), BusError>
where
    S: EventSource,
    B: MessageBus,
    H: BusHandler,
{
    handler.on_connect(&mut *bus).await?;

    loop {
        match source.next_event().await {
            Ok(Some(BusEvent::Connected)) => {
                backoff.reset();
                if let Err(e) = handler.on_connect(&mut *bus).await {
                    error!("Failed to restore subscriptions: {}", e);
                }
            }
            Ok(Some(BusEvent::Message { topic, payload })) => {
                handler.on_message(&mut *bus, &topic, &payload).await;
            }
            Ok(Some(BusEvent::Other)) => {}
            Ok(None) => {
                info!("MQTT client disconnected");
                return Ok(());
            }
            Err(e) => {
                handler.on_disconnect(&e);
                let delay = backoff.next_delay();
                warn!("Reconnecting to MQTT broker in {:?}", delay);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn refused() -> BusError {
        BusError::Connection(rumqttc::ConnectionError::ConnectionRefused(
            rumqttc::ConnectReturnCode::ServiceUnavailable,
        ))
    }

    /// Fails the first `failures` connection attempts.
    struct FlakyBroker {
        failures: u32,
        polls: u32,
    }

    impl EventSource for FlakyBroker {
        async fn next_event(&mut self) -> Result<Option<BusEvent>, BusError> {
            self.polls += 1;
            if self.polls <= self.failures {
                Err(refused())
            } else {
                Ok(Some(BusEvent::Connected))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_fifth_attempt() {
        let mut broker = FlakyBroker { failures: 4, polls: 0 };
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(5),
        };

        let started = tokio::time::Instant::now();
        let attempts = connect_with_retry(&mut broker, &policy).await.unwrap();

        assert_eq!(attempts, 5);
        assert_eq!(broker.polls, 5);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let mut broker = FlakyBroker {
            failures: u32::MAX,
            polls: 0,
        };
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(5),
        };

        let result = connect_with_retry(&mut broker, &policy).await;

        assert!(matches!(result, Err(BusError::RetriesExhausted { attempts: 5, .. })));
        assert_eq!(broker.polls, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 10, 10]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_client_id_defaults_to_program_name() {
        let settings: MqttSettings = serde_json::from_str(r#"{"broker": "emqx"}"#).unwrap();
        let options = mqtt_options(&settings, "poe-control");
        assert!(options.client_id().starts_with("poe-control-"));
        assert_eq!(options.broker_address(), ("emqx".to_string(), 1883));
    }

    /// Replays a fixed event list, then reports a clean disconnect.
    struct Replay(VecDeque<Result<BusEvent, BusError>>);

    impl EventSource for Replay {
        async fn next_event(&mut self) -> Result<Option<BusEvent>, BusError> {
            self.0.pop_front().transpose()
        }
    }

    #[derive(Default)]
    struct NullBus;

    impl MessageBus for NullBus {
        async fn subscribe(&mut self, _topic: &str) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish(&mut self, _topic: &str, _payload: Vec<u8>) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl BusHandler for Recorder {
        async fn on_connect<B: MessageBus>(&mut self, _bus: &mut B) -> Result<(), BusError> {
            self.calls.push("connect".into());
            Ok(())
        }

        async fn on_message<B: MessageBus>(&mut self, _bus: &mut B, topic: &str, _payload: &[u8]) {
            self.calls.push(format!("message {topic}"));
        }

        fn on_disconnect(&mut self, _error: &BusError) {
            self.calls.push("disconnect".into());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_order_and_reconnect() {
        let mut source = Replay(VecDeque::from([
            Ok(BusEvent::Message {
                topic: "ubnt24/poe/1".into(),
                payload: b"1".to_vec(),
            }),
            Ok(BusEvent::Other),
            Err(refused()),
            Err(refused()),
            Ok(BusEvent::Connected),
            Ok(BusEvent::Message {
                topic: "ubnt24/poe/2".into(),
                payload: b"0".to_vec(),
            }),
        ]));
        let mut handler = Recorder::default();
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        dispatch(&mut source, &mut NullBus, &mut handler, &mut backoff).await.unwrap();

        assert_eq!(
            handler.calls,
            [
                "connect",
                "message ubnt24/poe/1",
                "disconnect",
                "disconnect",
                "connect",
                "message ubnt24/poe/2"
            ]
        );
        // 1s + 2s of backoff, reset after the reconnection
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
