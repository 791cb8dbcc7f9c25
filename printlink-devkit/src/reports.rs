/*!
Builders for printer reports shaped like the firmware sends them.

Numbers inside storage fragments are strings, as on the wire.
*/

use serde_json::{json, Map, Value};

/// Builds one `{"print": {...}}` report.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    print: Map<String, Value>,
}

impl ReportBuilder {
    /// Delta report carrying only the `push_status` discriminator.
    pub fn new() -> Self {
        let mut print = Map::new();
        print.insert("command".into(), json!("push_status"));
        print.insert("msg".into(), json!(1));
        Self { print }
    }

    /// Report a printer sends in answer to a full refresh while idle.
    pub fn full_status() -> Self {
        Self::new()
            .field("msg", json!(0))
            .gcode_state("IDLE")
            .stage(255)
            .temperatures(24.5, 0.0, 26.0, 0.0)
            .field("chamber_temper", json!(5))
            .field("nozzle_diameter", json!("0.4"))
            .field("nozzle_type", json!("hardened_steel"))
            .field("spd_lvl", json!(2))
            .field("spd_mag", json!(100))
            .field("wifi_signal", json!("-44dBm"))
            .field("lifecycle", json!("product"))
            .field("sdcard", json!(true))
            .field("lights_report", json!([{"node": "chamber_light", "mode": "on"}]))
            .field("s_obj", json!([]))
            .storage(
                "1",
                vec![storage_unit(
                    "0",
                    "4",
                    "22.1",
                    vec![
                        TrayBuilder::new("0", "GFA00").build(),
                        TrayBuilder::empty("1"),
                        TrayBuilder::new("2", "GFG99").material_type("PETG").color("FF6A13FF").build(),
                        TrayBuilder::empty("3"),
                    ],
                )],
            )
            .external_tray(TrayBuilder::new("254", "GFL99").build())
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.print.insert(key.to_string(), value);
        self
    }

    pub fn gcode_state(self, state: &str) -> Self {
        self.field("gcode_state", json!(state))
    }

    pub fn stage(self, code: i64) -> Self {
        self.field("stg_cur", json!(code))
    }

    pub fn progress(self, percent: i64, remaining_minutes: i64) -> Self {
        self.field("mc_percent", json!(percent))
            .field("mc_remaining_time", json!(remaining_minutes))
    }

    pub fn layers(self, current: i64, total: i64) -> Self {
        self.field("layer_num", json!(current))
            .field("total_layer_num", json!(total))
    }

    pub fn temperatures(self, bed: f64, bed_target: f64, nozzle: f64, nozzle_target: f64) -> Self {
        self.field("bed_temper", json!(bed))
            .field("bed_target_temper", json!(bed_target))
            .field("nozzle_temper", json!(nozzle))
            .field("nozzle_target_temper", json!(nozzle_target))
    }

    /// `ams` fragment with the given existence bitmask and units.
    pub fn storage(self, exist_bits: &str, units: Vec<Value>) -> Self {
        self.field("ams", json!({"ams_exist_bits": exist_bits, "tray_exist_bits": "f", "ams": units}))
    }

    pub fn external_tray(self, tray: Value) -> Self {
        self.field("vt_tray", tray)
    }

    pub fn build(self) -> Value {
        json!({"print": self.print})
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.build().to_string().into_bytes()
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One storage unit fragment.
pub fn storage_unit(id: &str, humidity: &str, temp: &str, trays: Vec<Value>) -> Value {
    json!({"id": id, "humidity": humidity, "temp": temp, "tray": trays})
}

/// Builds a per-slot fragment.
#[derive(Debug, Clone)]
pub struct TrayBuilder {
    tray: Map<String, Value>,
}

impl TrayBuilder {
    pub fn new(id: &str, material_id: &str) -> Self {
        let mut tray = Map::new();
        tray.insert("id".into(), json!(id));
        tray.insert("tray_info_idx".into(), json!(material_id));
        tray.insert("tray_type".into(), json!("PLA"));
        tray.insert("tray_sub_brands".into(), json!(""));
        tray.insert("tray_color".into(), json!("FFFFFFFF"));
        tray.insert("nozzle_temp_min".into(), json!("190"));
        tray.insert("nozzle_temp_max".into(), json!("230"));
        tray.insert("remain".into(), json!(100));
        tray.insert("k".into(), json!(0.02));
        Self { tray }
    }

    /// Slot fragment of a physically empty slot.
    pub fn empty(id: &str) -> Value {
        json!({"id": id})
    }

    pub fn material_type(mut self, kind: &str) -> Self {
        self.tray.insert("tray_type".into(), json!(kind));
        self
    }

    pub fn color(mut self, rgba: &str) -> Self {
        self.tray.insert("tray_color".into(), json!(rgba));
        self
    }

    pub fn nozzle_range(mut self, min: &str, max: &str) -> Self {
        self.tray.insert("nozzle_temp_min".into(), json!(min));
        self.tray.insert("nozzle_temp_max".into(), json!(max));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.tray)
    }
}
