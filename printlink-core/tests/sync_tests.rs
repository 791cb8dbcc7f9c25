use printlink_core::{ClientConfig, LinkHandler, PrinterError, ReportKey};
use printlink_devkit::{ReportBuilder, TestHarness};
use serde_json::{json, Value};

#[tokio::test]
async fn later_reports_overwrite_earlier_fields() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::new().temperatures(20.0, 0.0, 25.0, 0.0).layers(1, 200).build());
    harness.push_report(&ReportBuilder::new().field("bed_temper", json!(55.5)).build());

    assert_eq!(harness.sync.read_field("bed_temper", json!(0.0)).await.unwrap(), json!(55.5));
    assert_eq!(harness.sync.read_field("nozzle_temper", json!(0.0)).await.unwrap(), json!(25.0));
    assert_eq!(harness.sync.read(ReportKey::TotalLayerNum, json!(0)).await.unwrap(), json!(200));
}

#[tokio::test]
async fn never_reported_fields_return_the_default() {
    let harness = TestHarness::new();
    // not ready yet
    assert_eq!(harness.sync.read_field("layer_num", json!(7)).await.unwrap(), json!(7));

    harness.push_report(&ReportBuilder::new().gcode_state("IDLE").build());
    assert_eq!(harness.sync.read_field("layer_num", json!(7)).await.unwrap(), json!(7));
    assert_eq!(
        harness.sync.read_field("some_future_field", Value::Null).await.unwrap(),
        Value::Null
    );
}

#[tokio::test]
async fn reads_before_ready_skip_the_throttle() {
    let harness = TestHarness::new();
    harness.sync.read_field("bed_temper", json!(0.0)).await.unwrap();
    assert_eq!(harness.refresh_count(), 0);
    assert_eq!(harness.sync.throttle().last_refresh(), 0);

    harness.transport.set_connected(false);
    harness.push_report(&ReportBuilder::new().gcode_state("IDLE").build());
    assert_eq!(harness.sync.read_field("gcode_state", json!("")).await.unwrap(), json!(""));
    assert_eq!(harness.refresh_count(), 0);
}

#[tokio::test]
async fn strict_mode_reports_not_ready() {
    let mut config = TestHarness::test_config();
    config.strict = true;
    let harness = TestHarness::with_config(config);

    let err = harness.sync.read_field("bed_temper", json!(0.0)).await.unwrap_err();
    assert!(matches!(err, PrinterError::NotReady));
    assert!(harness.status.bed_temperature().await.is_err());

    harness.push_report(&ReportBuilder::new().temperatures(60.0, 60.0, 220.0, 220.0).build());
    assert_eq!(harness.status.bed_temperature().await.unwrap(), 60.0);
}

#[tokio::test]
async fn reads_within_the_interval_refresh_at_most_once() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::full_status().build());

    harness.sync.read_field("bed_temper", json!(0.0)).await.unwrap();
    harness.sync.read_field("nozzle_temper", json!(0.0)).await.unwrap();
    harness.status.export().await.unwrap();

    assert_eq!(harness.refresh_count(), 1);
    assert!(harness.sync.throttle().last_refresh() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_share_one_refresh() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::full_status().build());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let sync = harness.sync.clone();
            tokio::spawn(async move { sync.read_field("bed_temper", json!(0.0)).await })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), json!(24.5));
    }
    assert_eq!(harness.refresh_count(), 1);
}

#[tokio::test]
async fn malformed_reports_leave_the_snapshot_alone() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::new().gcode_state("RUNNING").build());
    let before = harness.sync.dump();

    harness.push_raw(b"{not json");
    harness.push_raw(br#"{"print": 42}"#);
    harness.push_raw(br#"{"info": {"command": "get_version", "module": []}}"#);
    harness.push_raw(b"");

    assert_eq!(harness.sync.dump(), before);
}

#[tokio::test]
async fn foreign_topics_are_ignored() {
    let harness = TestHarness::new();
    harness.sync.on_message("device/OTHER/report", ReportBuilder::new().gcode_state("PAUSE").to_bytes().as_slice());
    assert!(!harness.sync.ready());
}

#[tokio::test]
async fn on_connect_subscribes_then_refreshes() {
    let harness = TestHarness::new();
    harness.connect().await;

    assert_eq!(harness.transport.get_subscriptions(), vec![harness.report_topic()]);
    assert_eq!(harness.refresh_count(), 1);
    harness
        .assert_message_sent(&json!({"pushing": {"command": "pushall"}}))
        .unwrap();
}

#[tokio::test]
async fn on_connect_without_aggressive_sync_only_subscribes() {
    let mut config: ClientConfig = TestHarness::test_config();
    config.refresh_on_connect = false;
    let harness = TestHarness::with_config(config);
    harness.connect().await;

    assert_eq!(harness.transport.get_subscriptions().len(), 1);
    assert_eq!(harness.refresh_count(), 0);
}

#[tokio::test]
async fn request_refresh_reports_transport_state() {
    let harness = TestHarness::new();
    assert!(harness.sync.request_refresh().await);

    harness.transport.set_connected(false);
    assert!(!harness.sync.request_refresh().await);
    assert_eq!(harness.refresh_count(), 1);
}

#[tokio::test]
async fn dump_keeps_unrecognized_fields() {
    let harness = TestHarness::new();
    harness.push_report(
        &ReportBuilder::new()
            .gcode_state("IDLE")
            .field("xcam", json!({"allow_skip_parts": false}))
            .build(),
    );

    let dump = harness.sync.dump();
    assert_eq!(dump["gcode_state"], "IDLE");
    assert_eq!(dump["xcam"]["allow_skip_parts"], false);

    let mut unknown = harness.sync.unrecognized_keys();
    unknown.sort();
    assert_eq!(unknown, vec!["command", "msg", "xcam"]);
}

#[tokio::test]
async fn decoded_documents_merge_like_reports() {
    let harness = TestHarness::new();
    let merged = harness
        .sync
        .apply_document(&json!({"print": {"bed_temper": 41.0, "layer_num": 3}}));
    assert_eq!(merged, 2);

    assert_eq!(harness.sync.apply_document(&json!({"print": "push_status"})), 0);
    assert_eq!(harness.sync.apply_document(&json!({"info": {"command": "get_version"}})), 0);

    let dump = harness.sync.dump();
    assert_eq!(dump.len(), 2);
    assert_eq!(dump["bed_temper"], 41.0);
    assert_eq!(dump["layer_num"], 3);
}
