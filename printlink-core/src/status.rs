//! Enumerated device states decoded from report fields.
//!
//! Firmware updates add codes without notice, so every decoder here is total:
//! anything unrecognised becomes `Unknown` instead of an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job execution state reported in `gcode_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GcodeState {
    Idle,
    Prepare,
    Running,
    Pause,
    Finish,
    Failed,
    #[default]
    Unknown,
}

impl GcodeState {
    const ORDERED: [GcodeState; 6] = [
        Self::Idle,
        Self::Prepare,
        Self::Running,
        Self::Pause,
        Self::Finish,
        Self::Failed,
    ];

    /// Decode from a report value.
    ///
    /// The device sends the state name (`"RUNNING"`); integer codes index the
    /// states in declaration order. Anything else is `Unknown`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(name) => Self::from_name(name),
            Value::Number(n) => n
                .as_u64()
                .and_then(|code| Self::ORDERED.get(code as usize).copied())
                .unwrap_or(Self::Unknown),
            _ => Self::Unknown,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Self::Idle,
            "PREPARE" => Self::Prepare,
            "RUNNING" => Self::Running,
            "PAUSE" => Self::Pause,
            "FINISH" => Self::Finish,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Prepare => "PREPARE",
            Self::Running => "RUNNING",
            Self::Pause => "PAUSE",
            Self::Finish => "FINISH",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for GcodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! print_stages {
    ($($variant:ident = $code:literal => $label:literal,)*) => {
        /// Fine-grained stage reported in `stg_cur`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum PrintStage {
            $($variant,)*
            #[default]
            Unknown,
        }

        impl PrintStage {
            pub fn from_code(code: i64) -> Self {
                match code {
                    $($code => Self::$variant,)*
                    _ => Self::Unknown,
                }
            }

            /// Numeric code, `-1` for `Unknown`.
            pub fn code(&self) -> i64 {
                match self {
                    $(Self::$variant => $code,)*
                    Self::Unknown => -1,
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                    Self::Unknown => "Unknown",
                }
            }
        }
    };
}

print_stages! {
    Printing = 0 => "Printing",
    AutoBedLeveling = 1 => "Auto bed leveling",
    HeatbedPreheating = 2 => "Heatbed preheating",
    SweepingXyMechMode = 3 => "Sweeping XY mech mode",
    ChangingFilament = 4 => "Changing filament",
    M400Pause = 5 => "M400 pause",
    PausedFilamentRunout = 6 => "Paused due to filament runout",
    HeatingHotend = 7 => "Heating hotend",
    CalibratingExtrusion = 8 => "Calibrating extrusion",
    ScanningBedSurface = 9 => "Scanning bed surface",
    InspectingFirstLayer = 10 => "Inspecting first layer",
    IdentifyingBuildPlateType = 11 => "Identifying build plate type",
    CalibratingMicroLidar = 12 => "Calibrating micro lidar",
    HomingToolhead = 13 => "Homing toolhead",
    CleaningNozzleTip = 14 => "Cleaning nozzle tip",
    CheckingExtruderTemperature = 15 => "Checking extruder temperature",
    PausedUser = 16 => "Paused by the user",
    PausedFrontCoverFalling = 17 => "Pause of front cover falling",
    CalibratingLidar = 18 => "Calibrating lidar",
    CalibratingExtrusionFlow = 19 => "Calibrating extrusion flow",
    PausedNozzleTemperatureMalfunction = 20 => "Paused due to nozzle temperature malfunction",
    PausedHeatBedTemperatureMalfunction = 21 => "Paused due to heat bed temperature malfunction",
    FilamentUnloading = 22 => "Filament unloading",
    PausedSkippedStep = 23 => "Paused due to skipped step",
    FilamentLoading = 24 => "Filament loading",
    CalibratingMotorNoise = 25 => "Calibrating motor noise",
    PausedAmsLost = 26 => "Paused due to storage unit lost",
    PausedLowFanSpeedHeatBreak = 27 => "Paused due to low heatbreak fan speed",
    PausedChamberTemperatureControlError = 28 => "Paused due to chamber temperature control error",
    CoolingChamber = 29 => "Cooling chamber",
    PausedUserGcode = 30 => "Paused by user G-code",
    MotorNoiseShowoff = 31 => "Motor noise showoff",
    PausedNozzleFilamentCoveredDetected = 32 => "Paused due to nozzle covered by filament",
    PausedCutterError = 33 => "Paused due to cutter error",
    PausedFirstLayerError = 34 => "Paused due to first layer error",
    PausedNozzleClog = 35 => "Paused due to nozzle clog",
    Idle = 255 => "Idle",
}

impl PrintStage {
    /// Decode from a report value; numeric strings are accepted.
    pub fn from_value(value: &Value) -> Self {
        let code = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        code.map(Self::from_code).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for PrintStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Nozzle material reported in `nozzle_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NozzleType {
    #[default]
    StainlessSteel,
    HardenedSteel,
    Unknown,
}

impl NozzleType {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "stainless_steel" => Self::StainlessSteel,
            "hardened_steel" => Self::HardenedSteel,
            _ => Self::Unknown,
        }
    }
}

/// A reading that may be a value, explicitly unknown, or absent.
///
/// The device reports `"Unknown"` for progress it cannot estimate and omits
/// the field entirely when no job is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    Value(T),
    Unknown,
    Absent,
}

impl<T: Serialize> Serialize for Reading<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unknown => serializer.serialize_str("Unknown"),
            Self::Absent => serializer.serialize_none(),
        }
    }
}

impl<T> Reading<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gcode_state_decodes_names_and_codes() {
        assert_eq!(GcodeState::from_value(&json!("RUNNING")), GcodeState::Running);
        assert_eq!(GcodeState::from_value(&json!("pause")), GcodeState::Pause);
        assert_eq!(GcodeState::from_value(&json!(3)), GcodeState::Pause);
        assert_eq!(GcodeState::from_value(&json!("SLICING")), GcodeState::Unknown);
        assert_eq!(GcodeState::from_value(&json!(-1)), GcodeState::Unknown);
        assert_eq!(GcodeState::from_value(&json!(42)), GcodeState::Unknown);
        assert_eq!(GcodeState::from_value(&Value::Null), GcodeState::Unknown);
    }

    #[test]
    fn print_stage_falls_back_to_unknown() {
        assert_eq!(PrintStage::from_value(&json!(13)), PrintStage::HomingToolhead);
        assert_eq!(PrintStage::from_value(&json!("2")), PrintStage::HeatbedPreheating);
        assert_eq!(PrintStage::from_value(&json!(255)), PrintStage::Idle);
        assert_eq!(PrintStage::from_value(&json!(-1)), PrintStage::Unknown);
        assert_eq!(PrintStage::from_value(&json!(77)), PrintStage::Unknown);
        assert_eq!(PrintStage::Unknown.code(), -1);
        assert_eq!(PrintStage::Printing.label(), "Printing");
    }

    #[test]
    fn reading_serializes_tri_state() {
        assert_eq!(serde_json::to_value(Reading::Value(42)).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(Reading::<i64>::Unknown).unwrap(), json!("Unknown"));
        assert_eq!(serde_json::to_value(Reading::<i64>::Absent).unwrap(), Value::Null);
    }
}
