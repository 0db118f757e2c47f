/*!
# PoE bridge DevKit - stubs for testing without a broker or a switch

- Mock MQTT client recording publishes and subscriptions, replaying inbound events
- Scripted switch shell recording every line typed into it
- `show poe status` transcript builders
- A harness wiring the three together
*/

pub mod fixtures;
pub mod mqtt_stub;
pub mod shell_stub;
pub mod test_utils;

pub use fixtures::PoeTableBuilder;
pub use mqtt_stub::MockMqttClient;
pub use shell_stub::MockSwitch;
pub use test_utils::TestHarness;
