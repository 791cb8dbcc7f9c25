//! Report decoding and the merged state snapshot.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{PrinterError, Result};

macro_rules! report_keys {
    ($($variant:ident => $name:literal,)*) => {
        /// Every report field the accessor layer knows how to read.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ReportKey {
            $($variant,)*
        }

        impl ReportKey {
            pub const ALL: &'static [ReportKey] = &[$(Self::$variant,)*];

            /// Field name on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

report_keys! {
    McPercent => "mc_percent",
    McRemainingTime => "mc_remaining_time",
    SequenceId => "sequence_id",
    GcodeState => "gcode_state",
    GcodeFile => "gcode_file",
    SpdMag => "spd_mag",
    LightsReport => "lights_report",
    SkippedObjects => "s_obj",
    StgCur => "stg_cur",
    BedTemper => "bed_temper",
    BedTargetTemper => "bed_target_temper",
    NozzleType => "nozzle_type",
    NozzleDiameter => "nozzle_diameter",
    NozzleTemper => "nozzle_temper",
    NozzleTargetTemper => "nozzle_target_temper",
    LayerNum => "layer_num",
    TotalLayerNum => "total_layer_num",
    GcodeFilePreparePercent => "gcode_file_prepare_percent",
    Ams => "ams",
    VtTray => "vt_tray",
    ChamberTemper => "chamber_temper",
    McPrintStage => "mc_print_stage",
    HeatbreakFanSpeed => "heatbreak_fan_speed",
    CoolingFanSpeed => "cooling_fan_speed",
    BigFan1Speed => "big_fan1_speed",
    BigFan2Speed => "big_fan2_speed",
    AmsStatus => "ams_status",
    AmsRfidStatus => "ams_rfid_status",
    HwSwitchState => "hw_switch_state",
    SpdLvl => "spd_lvl",
    PrintError => "print_error",
    Lifecycle => "lifecycle",
    WifiSignal => "wifi_signal",
    QueueNumber => "queue_number",
    QueueTotal => "queue_total",
    QueueEst => "queue_est",
    QueueSts => "queue_sts",
    ProjectId => "project_id",
    ProfileId => "profile_id",
    TaskId => "task_id",
    SubtaskId => "subtask_id",
    SubtaskName => "subtask_name",
    PrintType => "print_type",
    HomeFlag => "home_flag",
    McPrintLineNumber => "mc_print_line_number",
    McPrintSubStage => "mc_print_sub_stage",
    Sdcard => "sdcard",
    ForceUpgrade => "force_upgrade",
    MessProductionState => "mess_production_state",
    FilamBak => "filam_bak",
    FanGear => "fan_gear",
    CaliVersion => "cali_version",
}

/// Top-level shape of an inbound report. Other domains are ignored.
#[derive(Debug, Deserialize)]
pub struct ReportEnvelope {
    pub print: Option<Map<String, Value>>,
}

/// Decode a raw payload into its `print` section, if any.
pub fn decode_report(payload: &[u8]) -> Result<Option<Map<String, Value>>> {
    serde_json::from_slice::<ReportEnvelope>(payload)
        .map(|envelope| envelope.print)
        .map_err(|e| PrinterError::MalformedReport(e.to_string()))
}

/// Merged view of every `print` field reported so far.
///
/// Known fields are indexed by [`ReportKey`]; the rest are kept verbatim so
/// new firmware fields stay visible in dumps.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    known: HashMap<ReportKey, Value>,
    unrecognized: Map<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow key-wise overwrite. Returns the number of fields written.
    pub fn merge(&mut self, section: Map<String, Value>) -> usize {
        let count = section.len();
        for (name, value) in section {
            match ReportKey::from_name(&name) {
                Some(key) => {
                    self.known.insert(key, value);
                }
                None => {
                    self.unrecognized.insert(name, value);
                }
            }
        }
        count
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match ReportKey::from_name(name) {
            Some(key) => self.known.get(&key),
            None => self.unrecognized.get(name),
        }
    }

    pub fn get_key(&self, key: ReportKey) -> Option<&Value> {
        self.known.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unrecognized.is_empty()
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.unrecognized.len()
    }

    pub fn unrecognized_keys(&self) -> Vec<String> {
        self.unrecognized.keys().cloned().collect()
    }

    /// Flatten back into one document, known fields first in key order.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        for key in ReportKey::ALL {
            if let Some(value) = self.known.get(key) {
                doc.insert(key.as_str().to_string(), value.clone());
            }
        }
        for (name, value) in &self.unrecognized {
            doc.insert(name.clone(), value.clone());
        }
        doc
    }
}

// Lenient readers for nested fragments, where firmware mixes numbers and
// numeric strings freely.

pub(crate) fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Strict coercions used by the accessor layer. A present value of the wrong
// shape is an error.

pub fn as_int(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| PrinterError::coercion(key, "an integer", value)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| PrinterError::coercion(key, "an integer", value)),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(PrinterError::coercion(key, "an integer", value)),
    }
}

pub fn as_float(key: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| PrinterError::coercion(key, "a number", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| PrinterError::coercion(key, "a number", value)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(PrinterError::coercion(key, "a number", value)),
    }
}

pub fn as_text(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(PrinterError::coercion(key, "a string", value)),
    }
}

pub fn as_flag(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(PrinterError::coercion(key, "a boolean", value)),
        },
        _ => Err(PrinterError::coercion(key, "a boolean", value)),
    }
}

pub fn as_list(key: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(PrinterError::coercion(key, "a list", value)),
    }
}

pub fn as_int_list(key: &str, value: &Value) -> Result<Vec<i64>> {
    as_list(key, value)?
        .iter()
        .map(|item| as_int(key, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_is_last_write_wins() {
        let mut snapshot = Snapshot::new();
        snapshot.merge(section(json!({"bed_temper": 20.0, "layer_num": 1})));
        snapshot.merge(section(json!({"bed_temper": 60.5})));

        assert_eq!(snapshot.get("bed_temper"), Some(&json!(60.5)));
        assert_eq!(snapshot.get("layer_num"), Some(&json!(1)));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn unknown_fields_land_in_the_unrecognized_bucket() {
        let mut snapshot = Snapshot::new();
        snapshot.merge(section(json!({"command": "push_status", "msg": 1, "mc_percent": 5})));

        let mut unknown = snapshot.unrecognized_keys();
        unknown.sort();
        assert_eq!(unknown, vec!["command", "msg"]);
        assert_eq!(snapshot.get_key(ReportKey::McPercent), Some(&json!(5)));
        assert_eq!(snapshot.get("msg"), Some(&json!(1)));
    }

    #[test]
    fn decode_ignores_other_domains() {
        assert!(decode_report(br#"{"info": {"command": "get_version"}}"#).unwrap().is_none());
        let print = decode_report(br#"{"print": {"mc_percent": 12}}"#).unwrap().unwrap();
        assert_eq!(print.get("mc_percent"), Some(&json!(12)));
    }

    #[test]
    fn decode_rejects_malformed_print_section() {
        assert!(matches!(
            decode_report(br#"{"print": "oops"}"#),
            Err(PrinterError::MalformedReport(_))
        ));
        assert!(decode_report(b"not json").is_err());
    }

    #[test]
    fn coercions_accept_numeric_strings_and_reject_shapes() {
        assert_eq!(as_int("k", &json!("42")).unwrap(), 42);
        assert_eq!(as_int("k", &json!(42.9)).unwrap(), 42);
        assert_eq!(as_float("k", &json!("21.5")).unwrap(), 21.5);
        assert_eq!(as_text("k", &json!(7)).unwrap(), "7");
        assert!(as_flag("k", &json!(1)).unwrap());
        assert_eq!(as_int_list("k", &json!([1, "2"])).unwrap(), vec![1, 2]);

        assert!(matches!(as_int("k", &json!("abc")), Err(PrinterError::Coercion { .. })));
        assert!(as_text("k", &json!({"a": 1})).is_err());
        assert!(as_list("k", &json!(3)).is_err());
    }

    #[test]
    fn report_keys_round_trip() {
        for key in ReportKey::ALL {
            assert_eq!(ReportKey::from_name(key.as_str()), Some(*key));
        }
    }
}
