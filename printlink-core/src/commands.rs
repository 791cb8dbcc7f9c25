//! Outbound command documents.
//!
//! Every command serialises to a nested document under a `print`, `system`
//! or `pushing` domain key with a `command` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{PrinterError, Result};
use crate::filament::FilamentSetting;
use crate::storage::{EXTERNAL_SLOT_ID, EXTERNAL_UNIT_ID};

/// Target passed with `ams_change_filament` to load the external spool.
pub const LOAD_TARGET: u32 = 255;
/// Target passed with `ams_change_filament` to unload.
pub const UNLOAD_TARGET: u32 = 254;
/// Nozzle temperature used while changing filament.
pub const CHANGE_FILAMENT_TEMP: u32 = 215;

/// Print speed preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedLevel {
    Silent = 1,
    Standard = 2,
    Sport = 3,
    Ludicrous = 4,
}

impl SpeedLevel {
    pub fn from_level(level: i64) -> Result<Self> {
        match level {
            1 => Ok(Self::Silent),
            2 => Ok(Self::Standard),
            3 => Ok(Self::Sport),
            4 => Ok(Self::Ludicrous),
            other => Err(PrinterError::InvalidCommand(format!(
                "speed level {other} is not between 1 and 4"
            ))),
        }
    }

    pub fn level(&self) -> u8 {
        *self as u8
    }
}

/// Build plate surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedType {
    CoolPlate,
    EngPlate,
    HotPlate,
    #[default]
    TexturedPlate,
    Auto,
}

impl BedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoolPlate => "cool_plate",
            Self::EngPlate => "eng_plate",
            Self::HotPlate => "hot_plate",
            Self::TexturedPlate => "textured_plate",
            Self::Auto => "auto",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim() {
            "cool_plate" => Ok(Self::CoolPlate),
            "eng_plate" => Ok(Self::EngPlate),
            "hot_plate" => Ok(Self::HotPlate),
            "textured_plate" => Ok(Self::TexturedPlate),
            "auto" => Ok(Self::Auto),
            other => Err(PrinterError::InvalidCommand(format!("unknown bed type {other:?}"))),
        }
    }
}

/// Controllable fans and their `M106` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fan {
    Part = 1,
    Aux = 2,
    Chamber = 3,
}

impl Fan {
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

/// Fan speed as a raw duty (0–255) or a fraction (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FanSpeed {
    Duty(i64),
    Fraction(f64),
}

impl FanSpeed {
    /// Convert to the 0–255 duty scale. Fractions are rounded half away
    /// from zero.
    pub fn duty(&self) -> Result<u8> {
        match *self {
            Self::Duty(raw) => u8::try_from(raw).map_err(|_| {
                PrinterError::InvalidCommand(format!("fan speed {raw} is not between 0 and 255"))
            }),
            Self::Fraction(f) if (0.0..=1.0).contains(&f) => Ok((255.0 * f).round() as u8),
            Self::Fraction(f) => Err(PrinterError::InvalidCommand(format!(
                "fan speed {f} is not between 0 and 1"
            ))),
        }
    }
}

impl From<i64> for FanSpeed {
    fn from(raw: i64) -> Self {
        Self::Duty(raw)
    }
}

impl From<f64> for FanSpeed {
    fn from(fraction: f64) -> Self {
        Self::Fraction(fraction)
    }
}

/// Which calibrations to run. Packed as bit 1 bed levelling, bit 2
/// vibration compensation, bit 3 motor noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationOptions {
    pub bed_leveling: bool,
    pub vibration_compensation: bool,
    pub motor_noise: bool,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            bed_leveling: true,
            vibration_compensation: true,
            motor_noise: true,
        }
    }
}

impl CalibrationOptions {
    pub fn bitmask(&self) -> u32 {
        let mut mask = 0;
        if self.bed_leveling {
            mask |= 1 << 1;
        }
        if self.vibration_compensation {
            mask |= 1 << 2;
        }
        if self.motor_noise {
            mask |= 1 << 3;
        }
        mask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightMode {
    On,
    Off,
}

impl LightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Parameters for starting a stored project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPrintJob {
    /// File name on the printer storage.
    pub file: String,
    pub plate: u32,
    pub bed_leveling: bool,
    pub flow_calibration: bool,
    pub vibration_calibration: bool,
    pub bed_type: BedType,
    pub use_ams: bool,
    pub ams_mapping: Vec<i64>,
    /// Object ids to skip. An empty list means no skipping.
    pub skip_objects: Option<Vec<i64>>,
}

impl StartPrintJob {
    pub fn new(file: impl Into<String>, plate: u32) -> Self {
        Self {
            file: file.into(),
            plate,
            bed_leveling: true,
            flow_calibration: false,
            vibration_calibration: false,
            bed_type: BedType::TexturedPlate,
            use_ams: true,
            ams_mapping: vec![0],
            skip_objects: None,
        }
    }

    /// Start with every pre-print calibration enabled.
    pub fn calibrated(file: impl Into<String>, plate: u32) -> Self {
        Self {
            flow_calibration: true,
            vibration_calibration: true,
            ..Self::new(file, plate)
        }
    }

    pub fn plate_param(&self) -> String {
        format!("Metadata/plate_{}.gcode", self.plate)
    }

    pub fn url(&self) -> String {
        format!("ftp:///{}", self.file)
    }
}

/// Every command the dispatcher can publish.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterCommand {
    PushAll,
    StartPrint(StartPrintJob),
    Stop,
    Pause,
    Resume,
    SkipObjects(Vec<i64>),
    Light(LightMode),
    FilamentSetting {
        unit: u32,
        slot: u32,
        setting: FilamentSetting,
        /// Six hex digits, `RRGGBB`.
        color: String,
    },
    ChangeFilament { target: u32 },
    ResumeFilamentAction,
    Calibration(CalibrationOptions),
    PrintSpeed(SpeedLevel),
    AutoRecovery(bool),
    /// Already validated lines joined with `\n`.
    GcodeLine(String),
}

impl PrinterCommand {
    /// Filament setting for the external slot.
    pub fn external_filament(setting: FilamentSetting, color: impl Into<String>) -> Self {
        Self::FilamentSetting {
            unit: EXTERNAL_UNIT_ID,
            slot: EXTERNAL_SLOT_ID,
            setting,
            color: color.into(),
        }
    }

    /// `command` discriminator of the document.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PushAll => "pushall",
            Self::StartPrint(_) => "project_file",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::SkipObjects(_) => "skip_objects",
            Self::Light(_) => "ledctrl",
            Self::FilamentSetting { .. } => "ams_filament_setting",
            Self::ChangeFilament { .. } => "ams_change_filament",
            Self::ResumeFilamentAction => "ams_control",
            Self::Calibration(_) => "calibration",
            Self::PrintSpeed(_) => "print_speed",
            Self::AutoRecovery(_) => "print_option",
            Self::GcodeLine(_) => "gcode_line",
        }
    }

    /// Check parameters that can be wrong before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if let Self::FilamentSetting { color, .. } = self {
            if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PrinterError::InvalidCommand(format!(
                    "color {color:?} is not a 6 digit hex string"
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let name = self.name();
        match self {
            Self::PushAll => json!({"pushing": {"command": name}}),
            Self::StartPrint(job) => {
                let mut body = Map::new();
                body.insert("command".into(), json!(name));
                body.insert("param".into(), json!(job.plate_param()));
                body.insert("file".into(), json!(job.file));
                body.insert("bed_leveling".into(), json!(job.bed_leveling));
                body.insert("bed_type".into(), json!(job.bed_type.as_str()));
                body.insert("flow_cali".into(), json!(job.flow_calibration));
                body.insert("vibration_cali".into(), json!(job.vibration_calibration));
                body.insert("url".into(), json!(job.url()));
                body.insert("layer_inspect".into(), json!(false));
                body.insert("sequence_id".into(), json!("10000000"));
                body.insert("use_ams".into(), json!(job.use_ams));
                body.insert("ams_mapping".into(), json!(job.ams_mapping));
                if let Some(skip) = job.skip_objects.as_ref().filter(|s| !s.is_empty()) {
                    body.insert("skip_objects".into(), json!(skip));
                }
                json!({"print": body})
            }
            Self::Stop | Self::Pause | Self::Resume => json!({"print": {"command": name}}),
            Self::SkipObjects(ids) => json!({"print": {"command": name, "obj_list": ids}}),
            Self::Light(mode) => json!({
                "system": {
                    "command": name,
                    "led_node": "chamber_light",
                    "led_mode": mode.as_str(),
                    "led_on_time": 500,
                    "led_off_time": 500,
                    "loop_times": 0,
                    "interval_time": 0
                }
            }),
            Self::FilamentSetting { unit, slot, setting, color } => json!({
                "print": {
                    "command": name,
                    "ams_id": unit,
                    "tray_id": slot,
                    "tray_info_idx": setting.material_id,
                    "tray_color": format!("{}FF", color.to_ascii_uppercase()),
                    "nozzle_temp_min": setting.nozzle_temp.min,
                    "nozzle_temp_max": setting.nozzle_temp.max,
                    "tray_type": setting.material_type
                }
            }),
            Self::ChangeFilament { target } => json!({
                "print": {
                    "command": name,
                    "target": target,
                    "curr_temp": CHANGE_FILAMENT_TEMP,
                    "tar_temp": CHANGE_FILAMENT_TEMP
                }
            }),
            Self::ResumeFilamentAction => json!({"print": {"command": name, "param": "resume"}}),
            Self::Calibration(options) => {
                json!({"print": {"command": name, "option": options.bitmask()}})
            }
            Self::PrintSpeed(level) => {
                json!({"print": {"command": name, "param": level.level().to_string()}})
            }
            Self::AutoRecovery(enabled) => {
                json!({"print": {"command": name, "auto_recovery": enabled}})
            }
            Self::GcodeLine(lines) => json!({"print": {"command": name, "param": lines}}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filament::FilamentPreset;

    #[test]
    fn fan_speed_conversion() {
        assert_eq!(FanSpeed::Duty(128).duty().unwrap(), 128);
        assert_eq!(FanSpeed::Fraction(0.5).duty().unwrap(), 128);
        assert_eq!(FanSpeed::Fraction(0.0).duty().unwrap(), 0);
        assert_eq!(FanSpeed::Fraction(1.0).duty().unwrap(), 255);
        assert!(FanSpeed::Fraction(1.5).duty().is_err());
        assert!(FanSpeed::Duty(256).duty().is_err());
        assert!(FanSpeed::Duty(-1).duty().is_err());
    }

    #[test]
    fn calibration_bits() {
        let options = CalibrationOptions {
            bed_leveling: true,
            vibration_compensation: true,
            motor_noise: false,
        };
        assert_eq!(options.bitmask(), 6);
        assert_eq!(CalibrationOptions::default().bitmask(), 14);
    }

    #[test]
    fn start_print_document() {
        let doc = PrinterCommand::StartPrint(StartPrintJob::new("cube v2.3mf", 2)).to_json();
        let print = &doc["print"];
        assert_eq!(print["command"], "project_file");
        assert_eq!(print["param"], "Metadata/plate_2.gcode");
        assert_eq!(print["url"], "ftp:///cube v2.3mf");
        assert_eq!(print["sequence_id"], "10000000");
        assert_eq!(print["layer_inspect"], false);
        assert_eq!(print["bed_type"], "textured_plate");
        assert!(print.get("skip_objects").is_none());
    }

    #[test]
    fn empty_skip_list_is_omitted() {
        let mut job = StartPrintJob::new("a.3mf", 1);
        job.skip_objects = Some(vec![]);
        let doc = PrinterCommand::StartPrint(job.clone()).to_json();
        assert!(doc["print"].get("skip_objects").is_none());

        job.skip_objects = Some(vec![3, 7]);
        let doc = PrinterCommand::StartPrint(job).to_json();
        assert_eq!(doc["print"]["skip_objects"], json!([3, 7]));
    }

    #[test]
    fn filament_setting_color_rules() {
        let cmd = PrinterCommand::external_filament(FilamentPreset::Petg.setting(), "a1b2c3");
        cmd.validate().unwrap();
        let doc = cmd.to_json();
        assert_eq!(doc["print"]["tray_color"], "A1B2C3FF");
        assert_eq!(doc["print"]["ams_id"], 255);
        assert_eq!(doc["print"]["tray_id"], 254);
        assert_eq!(doc["print"]["tray_info_idx"], "GFG99");

        let bad = PrinterCommand::external_filament(FilamentPreset::Pla.setting(), "red");
        assert!(matches!(bad.validate(), Err(PrinterError::InvalidCommand(_))));
    }

    #[test]
    fn speed_levels_are_bounded() {
        assert_eq!(SpeedLevel::from_level(4).unwrap(), SpeedLevel::Ludicrous);
        assert!(SpeedLevel::from_level(0).is_err());
        assert!(SpeedLevel::from_level(5).is_err());
        let doc = PrinterCommand::PrintSpeed(SpeedLevel::Sport).to_json();
        assert_eq!(doc["print"]["param"], "3");
    }
}
