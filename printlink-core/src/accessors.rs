//! Typed reads over the merged snapshot.
//!
//! Every accessor has a fixed report key, default and coercion. A field
//! that is present but of the wrong shape is a [`PrinterError::Coercion`].
//!
//! [`PrinterError::Coercion`]: crate::error::PrinterError::Coercion

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::filament::MaterialSlot;
use crate::models::{as_flag, as_float, as_int, as_int_list, as_list, as_text, ReportKey};
use crate::status::{GcodeState, NozzleType, PrintStage, Reading};
use crate::storage::{parse_external_slot, StorageHub};
use crate::sync::StateSynchronizer;

#[derive(Clone)]
pub struct StatusReader {
    sync: Arc<StateSynchronizer>,
}

macro_rules! accessors {
    ($($(#[$doc:meta])* $name:ident -> $ty:ty = $kind:ident($key:ident, $default:expr);)*) => {
        impl StatusReader {
            $(
                $(#[$doc])*
                pub async fn $name(&self) -> Result<$ty> {
                    self.$kind(ReportKey::$key, $default).await
                }
            )*
        }
    };
}

impl StatusReader {
    pub fn new(sync: Arc<StateSynchronizer>) -> Self {
        Self { sync }
    }

    async fn int(&self, key: ReportKey, default: i64) -> Result<i64> {
        let value = self.sync.read(key, Value::from(default)).await?;
        as_int(key.as_str(), &value)
    }

    async fn float(&self, key: ReportKey, default: f64) -> Result<f64> {
        let value = self.sync.read(key, Value::from(default)).await?;
        as_float(key.as_str(), &value)
    }

    async fn text(&self, key: ReportKey, default: &str) -> Result<String> {
        let value = self.sync.read(key, Value::from(default)).await?;
        as_text(key.as_str(), &value)
    }

    async fn flag(&self, key: ReportKey, default: bool) -> Result<bool> {
        let value = self.sync.read(key, Value::from(default)).await?;
        as_flag(key.as_str(), &value)
    }

    async fn raw(&self, key: ReportKey) -> Result<Value> {
        self.sync.read(key, Value::Null).await
    }

    async fn reading(&self, key: ReportKey) -> Result<Reading<i64>> {
        match self.raw(key).await? {
            Value::Null => Ok(Reading::Absent),
            Value::String(s) if s.trim().parse::<i64>().is_err() => Ok(Reading::Unknown),
            value => as_int(key.as_str(), &value).map(Reading::Value),
        }
    }

    /// Job progress in percent.
    pub async fn print_percentage(&self) -> Result<Reading<i64>> {
        self.reading(ReportKey::McPercent).await
    }

    /// Remaining job time in minutes.
    pub async fn remaining_time(&self) -> Result<Reading<i64>> {
        self.reading(ReportKey::McRemainingTime).await
    }

    pub async fn gcode_state(&self) -> Result<GcodeState> {
        Ok(GcodeState::from_value(&self.raw(ReportKey::GcodeState).await?))
    }

    pub async fn print_stage(&self) -> Result<PrintStage> {
        Ok(PrintStage::from_value(&self.raw(ReportKey::StgCur).await?))
    }

    pub async fn nozzle_type(&self) -> Result<NozzleType> {
        let name = self.text(ReportKey::NozzleType, "stainless_steel").await?;
        Ok(NozzleType::from_name(&name))
    }

    /// Chamber light mode, `"unknown"` when not reported.
    pub async fn light_state(&self) -> Result<String> {
        let key = ReportKey::LightsReport;
        let lights = as_list(key.as_str(), &self.sync.read(key, Value::Array(vec![])).await?)?;
        let node = lights
            .iter()
            .find(|light| light.get("node").and_then(Value::as_str) == Some("chamber_light"))
            .or_else(|| lights.first());
        match node.and_then(|light| light.get("mode")) {
            Some(mode) => as_text(key.as_str(), mode),
            None => Ok("unknown".into()),
        }
    }

    pub async fn skipped_objects(&self) -> Result<Vec<i64>> {
        let key = ReportKey::SkippedObjects;
        as_int_list(key.as_str(), &self.sync.read(key, Value::Array(vec![])).await?)
    }

    pub async fn filament_backup(&self) -> Result<Vec<Value>> {
        let key = ReportKey::FilamBak;
        as_list(key.as_str(), &self.sync.read(key, Value::Array(vec![])).await?)
    }

    /// Storage units, rebuilt from the latest `ams` fragment.
    pub async fn storage_hub(&self) -> Result<StorageHub> {
        let fragment = self.raw(ReportKey::Ams).await?;
        Ok(StorageHub::parse(Some(&fragment).filter(|f| !f.is_null())))
    }

    /// Material in the manually fed external slot.
    pub async fn external_slot(&self) -> Result<Option<MaterialSlot>> {
        let fragment = self.raw(ReportKey::VtTray).await?;
        Ok(parse_external_slot(Some(&fragment).filter(|f| !f.is_null())))
    }
}

accessors! {
    sequence_id -> i64 = int(SequenceId, 0);
    /// Speed magnitude in percent.
    print_speed -> i64 = int(SpdMag, 100);
    current_layer -> i64 = int(LayerNum, 0);
    total_layers -> i64 = int(TotalLayerNum, 0);
    gcode_file_prepare_percentage -> i64 = int(GcodeFilePreparePercent, 0);
    ams_status -> i64 = int(AmsStatus, 0);
    ams_rfid_status -> i64 = int(AmsRfidStatus, 0);
    hardware_switch_state -> i64 = int(HwSwitchState, 0);
    /// Raw speed level, 1 (silent) to 4 (ludicrous).
    print_speed_level -> i64 = int(SpdLvl, 0);
    print_error -> i64 = int(PrintError, 0);
    queue_number -> i64 = int(QueueNumber, 0);
    queue_total -> i64 = int(QueueTotal, 0);
    queue_estimated_time -> i64 = int(QueueEst, 0);
    queue_status -> i64 = int(QueueSts, 0);
    /// Raw `stg_cur` code; see [`print_stage`](Self::print_stage).
    current_stage_code -> i64 = int(StgCur, 0);
    home_flag -> i64 = int(HomeFlag, 0);
    print_sub_stage -> i64 = int(McPrintSubStage, 0);
    fan_gear -> i64 = int(FanGear, 0);
    calibration_version -> i64 = int(CaliVersion, 0);

    bed_temperature -> f64 = float(BedTemper, 0.0);
    bed_target_temperature -> f64 = float(BedTargetTemper, 0.0);
    nozzle_temperature -> f64 = float(NozzleTemper, 0.0);
    nozzle_target_temperature -> f64 = float(NozzleTargetTemper, 0.0);
    nozzle_diameter -> f64 = float(NozzleDiameter, 0.0);
    chamber_temperature -> f64 = float(ChamberTemper, 0.0);

    file_name -> String = text(GcodeFile, "");
    nozzle_type_name -> String = text(NozzleType, "");
    /// Raw `gcode_state` text.
    gcode_state_name -> String = text(GcodeState, "");
    machine_print_stage -> String = text(McPrintStage, "");
    heatbreak_fan_speed -> String = text(HeatbreakFanSpeed, "0");
    cooling_fan_speed -> String = text(CoolingFanSpeed, "0");
    big_fan1_speed -> String = text(BigFan1Speed, "0");
    big_fan2_speed -> String = text(BigFan2Speed, "0");
    lifecycle -> String = text(Lifecycle, "");
    wifi_signal -> String = text(WifiSignal, "");
    project_id -> String = text(ProjectId, "");
    profile_id -> String = text(ProfileId, "");
    task_id -> String = text(TaskId, "");
    subtask_id -> String = text(SubtaskId, "");
    subtask_name -> String = text(SubtaskName, "");
    print_type -> String = text(PrintType, "");
    print_line_number -> String = text(McPrintLineNumber, "");
    production_state -> String = text(MessProductionState, "");

    sdcard_present -> bool = flag(Sdcard, false);
    force_upgrade -> bool = flag(ForceUpgrade, false);
}

/// Every accessor projected into one document with stable field names.
#[derive(Debug, Clone, Serialize)]
pub struct StatusExport {
    pub gcode_state: GcodeState,
    pub print_stage: PrintStage,
    pub print_stage_label: String,
    pub print_percentage: Reading<i64>,
    pub remaining_time: Reading<i64>,
    pub file_name: String,
    pub current_layer: i64,
    pub total_layers: i64,
    pub gcode_file_prepare_percentage: i64,
    pub print_speed: i64,
    pub print_speed_level: i64,
    pub print_error: i64,
    pub print_type: String,
    pub print_line_number: String,
    pub print_sub_stage: i64,
    pub machine_print_stage: String,
    pub sequence_id: i64,
    pub bed_temperature: f64,
    pub bed_target_temperature: f64,
    pub nozzle_temperature: f64,
    pub nozzle_target_temperature: f64,
    pub chamber_temperature: f64,
    pub nozzle_type: NozzleType,
    pub nozzle_diameter: f64,
    pub heatbreak_fan_speed: String,
    pub cooling_fan_speed: String,
    pub big_fan1_speed: String,
    pub big_fan2_speed: String,
    pub fan_gear: i64,
    pub light_state: String,
    pub skipped_objects: Vec<i64>,
    pub ams_status: i64,
    pub ams_rfid_status: i64,
    pub storage_hub: StorageHub,
    pub external_slot: Option<MaterialSlot>,
    pub filament_backup: Vec<Value>,
    pub hardware_switch_state: i64,
    pub home_flag: i64,
    pub queue_number: i64,
    pub queue_total: i64,
    pub queue_estimated_time: i64,
    pub queue_status: i64,
    pub project_id: String,
    pub profile_id: String,
    pub task_id: String,
    pub subtask_id: String,
    pub subtask_name: String,
    pub lifecycle: String,
    pub wifi_signal: String,
    pub production_state: String,
    pub sdcard_present: bool,
    pub force_upgrade: bool,
    pub calibration_version: i64,
}

impl StatusReader {
    pub async fn export(&self) -> Result<StatusExport> {
        let print_stage = self.print_stage().await?;
        Ok(StatusExport {
            gcode_state: self.gcode_state().await?,
            print_stage,
            print_stage_label: print_stage.label().to_string(),
            print_percentage: self.print_percentage().await?,
            remaining_time: self.remaining_time().await?,
            file_name: self.file_name().await?,
            current_layer: self.current_layer().await?,
            total_layers: self.total_layers().await?,
            gcode_file_prepare_percentage: self.gcode_file_prepare_percentage().await?,
            print_speed: self.print_speed().await?,
            print_speed_level: self.print_speed_level().await?,
            print_error: self.print_error().await?,
            print_type: self.print_type().await?,
            print_line_number: self.print_line_number().await?,
            print_sub_stage: self.print_sub_stage().await?,
            machine_print_stage: self.machine_print_stage().await?,
            sequence_id: self.sequence_id().await?,
            bed_temperature: self.bed_temperature().await?,
            bed_target_temperature: self.bed_target_temperature().await?,
            nozzle_temperature: self.nozzle_temperature().await?,
            nozzle_target_temperature: self.nozzle_target_temperature().await?,
            chamber_temperature: self.chamber_temperature().await?,
            nozzle_type: self.nozzle_type().await?,
            nozzle_diameter: self.nozzle_diameter().await?,
            heatbreak_fan_speed: self.heatbreak_fan_speed().await?,
            cooling_fan_speed: self.cooling_fan_speed().await?,
            big_fan1_speed: self.big_fan1_speed().await?,
            big_fan2_speed: self.big_fan2_speed().await?,
            fan_gear: self.fan_gear().await?,
            light_state: self.light_state().await?,
            skipped_objects: self.skipped_objects().await?,
            ams_status: self.ams_status().await?,
            ams_rfid_status: self.ams_rfid_status().await?,
            storage_hub: self.storage_hub().await?,
            external_slot: self.external_slot().await?,
            filament_backup: self.filament_backup().await?,
            hardware_switch_state: self.hardware_switch_state().await?,
            home_flag: self.home_flag().await?,
            queue_number: self.queue_number().await?,
            queue_total: self.queue_total().await?,
            queue_estimated_time: self.queue_estimated_time().await?,
            queue_status: self.queue_status().await?,
            project_id: self.project_id().await?,
            profile_id: self.profile_id().await?,
            task_id: self.task_id().await?,
            subtask_id: self.subtask_id().await?,
            subtask_name: self.subtask_name().await?,
            lifecycle: self.lifecycle().await?,
            wifi_signal: self.wifi_signal().await?,
            production_state: self.production_state().await?,
            sdcard_present: self.sdcard_present().await?,
            force_upgrade: self.force_upgrade().await?,
            calibration_version: self.calibration_version().await?,
        })
    }
}
