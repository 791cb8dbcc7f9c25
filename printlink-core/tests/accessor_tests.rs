use printlink_core::{GcodeState, NozzleType, PrintStage, PrinterError, Reading};
use printlink_devkit::{storage_unit, ReportBuilder, TestHarness, TrayBuilder};
use serde_json::json;

fn idle_printer() -> TestHarness {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::full_status().build());
    harness
}

#[tokio::test]
async fn typed_reads_from_a_full_status() {
    let harness = idle_printer();
    let status = &harness.status;

    assert_eq!(status.gcode_state().await.unwrap(), GcodeState::Idle);
    assert_eq!(status.print_stage().await.unwrap(), PrintStage::Idle);
    assert_eq!(status.bed_temperature().await.unwrap(), 24.5);
    assert_eq!(status.nozzle_temperature().await.unwrap(), 26.0);
    assert_eq!(status.chamber_temperature().await.unwrap(), 5.0);
    assert_eq!(status.nozzle_diameter().await.unwrap(), 0.4);
    assert_eq!(status.nozzle_type().await.unwrap(), NozzleType::HardenedSteel);
    assert_eq!(status.print_speed_level().await.unwrap(), 2);
    assert_eq!(status.wifi_signal().await.unwrap(), "-44dBm");
    assert!(status.sdcard_present().await.unwrap());
    assert_eq!(status.light_state().await.unwrap(), "on");
    assert!(status.skipped_objects().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_fields_fall_back_to_defaults() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::new().gcode_state("RUNNING").build());
    let status = &harness.status;

    assert_eq!(status.print_speed().await.unwrap(), 100);
    assert_eq!(status.file_name().await.unwrap(), "");
    assert_eq!(status.heatbreak_fan_speed().await.unwrap(), "0");
    assert_eq!(status.nozzle_type().await.unwrap(), NozzleType::StainlessSteel);
    assert_eq!(status.light_state().await.unwrap(), "unknown");
    assert!(!status.force_upgrade().await.unwrap());
    assert!(status.storage_hub().await.unwrap().is_empty());
    assert!(status.external_slot().await.unwrap().is_none());
}

#[tokio::test]
async fn progress_distinguishes_unknown_and_absent() {
    let harness = TestHarness::new();
    harness.push_report(&ReportBuilder::new().gcode_state("PREPARE").build());
    assert_eq!(harness.status.print_percentage().await.unwrap(), Reading::Absent);

    harness.push_report(
        &ReportBuilder::new()
            .field("mc_percent", json!("Unknown"))
            .field("mc_remaining_time", json!(17))
            .build(),
    );
    assert_eq!(harness.status.print_percentage().await.unwrap(), Reading::Unknown);
    assert_eq!(harness.status.remaining_time().await.unwrap(), Reading::Value(17));

    harness.push_report(&ReportBuilder::new().progress(42, 12).build());
    assert_eq!(harness.status.print_percentage().await.unwrap().value(), Some(42));
}

#[tokio::test]
async fn wrong_shape_is_a_coercion_error() {
    let harness = TestHarness::new();
    harness.push_report(
        &ReportBuilder::new()
            .field("layer_num", json!({"nested": true}))
            .field("bed_temper", json!("warm"))
            .field("s_obj", json!("none"))
            .build(),
    );

    match harness.status.current_layer().await {
        Err(PrinterError::Coercion { key, expected, .. }) => {
            assert_eq!(key, "layer_num");
            assert_eq!(expected, "an integer");
        }
        other => panic!("expected coercion error, got {other:?}"),
    }
    assert!(matches!(
        harness.status.bed_temperature().await,
        Err(PrinterError::Coercion { .. })
    ));
    assert!(harness.status.skipped_objects().await.is_err());
}

#[tokio::test]
async fn numeric_strings_are_accepted() {
    let harness = TestHarness::new();
    harness.push_report(
        &ReportBuilder::new()
            .field("layer_num", json!("12"))
            .field("stg_cur", json!("2"))
            .field("sdcard", json!(0))
            .build(),
    );

    assert_eq!(harness.status.current_layer().await.unwrap(), 12);
    assert_eq!(harness.status.print_stage().await.unwrap(), PrintStage::HeatbedPreheating);
    assert!(!harness.status.sdcard_present().await.unwrap());
}

#[tokio::test]
async fn unrecognised_enum_values_decode_as_unknown() {
    let harness = TestHarness::new();
    harness.push_report(
        &ReportBuilder::new()
            .gcode_state("SLICING")
            .stage(200)
            .field("nozzle_type", json!("tungsten_carbide"))
            .build(),
    );

    assert_eq!(harness.status.gcode_state().await.unwrap(), GcodeState::Unknown);
    assert_eq!(harness.status.print_stage().await.unwrap(), PrintStage::Unknown);
    assert_eq!(harness.status.nozzle_type().await.unwrap(), NozzleType::Unknown);
    assert_eq!(harness.status.nozzle_type_name().await.unwrap(), "tungsten_carbide");
}

#[tokio::test]
async fn storage_hub_reflects_the_latest_fragment() {
    let harness = idle_printer();

    let hub = harness.status.storage_hub().await.unwrap();
    assert_eq!(hub.len(), 1);
    let unit = hub.unit(0).unwrap();
    assert_eq!(unit.humidity, 4);
    assert_eq!(unit.temperature, 22.1);
    assert_eq!(unit.slots.len(), 2);
    assert_eq!(hub.slot(0, 2).unwrap().material_type, "PETG");
    assert!(hub.slot(0, 1).is_none());

    let external = harness.status.external_slot().await.unwrap().unwrap();
    assert_eq!(external.material_id, "GFL99");

    // a later fragment replaces the layout wholesale
    harness.push_report(
        &ReportBuilder::new()
            .storage(
                "2",
                vec![storage_unit("1", "3", "25", vec![TrayBuilder::new("0", "GFB99").build()])],
            )
            .build(),
    );
    let hub = harness.status.storage_hub().await.unwrap();
    assert!(hub.unit(0).is_none());
    assert_eq!(hub.slot(1, 0).unwrap().material_id, "GFB99");

    harness.push_report(&ReportBuilder::new().storage("0", vec![]).build());
    assert!(harness.status.storage_hub().await.unwrap().is_empty());
}

#[tokio::test]
async fn light_state_prefers_the_chamber_light() {
    let harness = TestHarness::new();
    harness.push_report(
        &ReportBuilder::new()
            .field(
                "lights_report",
                json!([
                    {"node": "work_light", "mode": "flashing"},
                    {"node": "chamber_light", "mode": "off"}
                ]),
            )
            .build(),
    );
    assert_eq!(harness.status.light_state().await.unwrap(), "off");

    harness.push_report(
        &ReportBuilder::new()
            .field("lights_report", json!([{"node": "work_light", "mode": "flashing"}]))
            .build(),
    );
    assert_eq!(harness.status.light_state().await.unwrap(), "flashing");
}

#[tokio::test]
async fn export_serialises_every_accessor() {
    let harness = idle_printer();
    harness.push_report(
        &ReportBuilder::new()
            .field("mc_percent", json!("Unknown"))
            .build(),
    );

    let export = harness.status.export().await.unwrap();
    let doc = serde_json::to_value(&export).unwrap();

    assert_eq!(doc["gcode_state"], "IDLE");
    assert_eq!(doc["print_stage_label"], "Idle");
    assert_eq!(doc["print_percentage"], "Unknown");
    assert!(doc["remaining_time"].is_null());
    assert_eq!(doc["bed_temperature"], 24.5);
    assert_eq!(doc["nozzle_type"], "hardened_steel");
    assert_eq!(doc["light_state"], "on");
    assert_eq!(doc["external_slot"]["material_id"], "GFL99");
}

#[tokio::test]
async fn strict_reads_before_the_first_report_fail() {
    let mut config = TestHarness::test_config();
    config.strict = true;
    let harness = TestHarness::with_config(config);

    assert!(matches!(
        harness.status.bed_temperature().await,
        Err(PrinterError::NotReady)
    ));

    harness.push_report(&ReportBuilder::full_status().build());
    assert_eq!(harness.status.bed_temperature().await.unwrap(), 24.5);
}
