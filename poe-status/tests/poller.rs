use poe_core::session::SessionDriver;
use poe_devkit::test_utils::STATUS_TOPIC;
use poe_devkit::{MockSwitch, PoeTableBuilder, TestHarness};
use poe_status::{CycleSummary, StatusPoller};
use serde_json::Value;
use std::time::Duration;

fn poller(harness: &TestHarness) -> StatusPoller<MockSwitch> {
    let driver = SessionDriver::new(harness.switch.clone(), harness.config.session.clone());
    StatusPoller::new(driver, harness.config.status_topic().unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_report() {
    let table = PoeTableBuilder::new().powered(1).searching(2).build();
    let harness = TestHarness::new().with_switch(MockSwitch::new().with_output("show poe status all", table));
    let poller = poller(&harness);
    let mut bus = harness.mqtt_client.clone();

    let summary = poller.run_cycle(&harness.config.servers, &mut bus).await;

    assert_eq!(summary, CycleSummary { published: 1, failed: 0 });
    let report: Value = harness.mqtt_client.get_last_json_message(STATUS_TOPIC).unwrap().unwrap();
    assert_eq!(report["server"], "sw1");
    assert!(report["timestamp"].is_f64());
    let rows = report["poe_status"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["intf"], "0/1");
    assert_eq!(rows[0]["consumed"], "4.25");
    assert_eq!(rows[1]["detection"], "Searching");
    harness
        .assert_field_equals(STATUS_TOPIC, "poe_status.1.temp", &Value::from("40"))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_commands_share_one_session() {
    let switch = MockSwitch::new()
        .with_output("show poe status 0/1", PoeTableBuilder::new().powered(1).build())
        .with_output("show poe status 0/2", PoeTableBuilder::new().powered(2).build());
    let mut harness = TestHarness::new().with_switch(switch);
    harness.config.servers[0].commands = vec!["show poe status 0/1".into(), "show poe status 0/2".into()];
    let poller = poller(&harness);

    let report = poller.poll_target(&harness.config.servers[0]).await.unwrap();

    let sessions = harness.switch.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].lines, ["enable", "ubnt", "show poe status 0/1", "show poe status 0/2"]);
    assert!(sessions[0].closed);
    let intfs: Vec<_> = report.poe_status.iter().map(|r| r.intf.as_str()).collect();
    assert_eq!(intfs, ["0/1", "0/2"]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_target_is_skipped() {
    let switch = MockSwitch::new()
        .with_unreachable("sw1")
        .with_output("show poe status all", PoeTableBuilder::new().powered(3).build());
    let harness = TestHarness::with_hosts(&["sw1", "sw2"]).with_switch(switch);
    let poller = poller(&harness);
    let mut bus = harness.mqtt_client.clone();

    let summary = poller.run_cycle(&harness.config.servers, &mut bus).await;

    assert_eq!(summary, CycleSummary { published: 1, failed: 1 });
    harness
        .assert_field_equals(STATUS_TOPIC, "server", &Value::from("sw2"))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_rows_publishes_empty_report() {
    let harness = TestHarness::new();
    let poller = poller(&harness);
    let mut bus = harness.mqtt_client.clone();

    poller.run_cycle(&harness.config.servers, &mut bus).await;

    harness
        .assert_field_equals(STATUS_TOPIC, "poe_status", &Value::Array(Vec::new()))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_target_without_commands_skips_the_switch() {
    let mut harness = TestHarness::with_hosts(&["sw1", "sw2"]);
    for server in &mut harness.config.servers {
        server.commands.clear();
    }
    let poller = poller(&harness);
    let mut bus = harness.mqtt_client.clone();

    let started = tokio::time::Instant::now();
    let summary = poller.run_cycle(&harness.config.servers, &mut bus).await;

    assert_eq!(summary.published, 2);
    assert_eq!(harness.switch.session_count(), 0);
    // one pause between the two targets, none after the last
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_is_counted() {
    let harness = TestHarness::new();
    harness.mqtt_client.fail_publishes(true);
    let poller = poller(&harness);
    let mut bus = harness.mqtt_client.clone();

    let summary = poller.run_cycle(&harness.config.servers, &mut bus).await;

    assert_eq!(summary, CycleSummary { published: 0, failed: 1 });
    assert!(harness.mqtt_client.get_published_messages().is_empty());
}
