//! Command dispatch: build, validate and publish commands.
//!
//! Validation errors surface as `Err` before anything is sent. Transport
//! trouble is logged and reported as `Ok(false)` or `false`, and the
//! dispatcher stays usable afterwards.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::commands::{
    CalibrationOptions, Fan, FanSpeed, LightMode, PrinterCommand, SpeedLevel, StartPrintJob,
    LOAD_TARGET, UNLOAD_TARGET,
};
use crate::error::Result;
use crate::filament::FilamentSetting;
use crate::gcode::validate_lines;
use crate::models::ReportKey;
use crate::status::GcodeState;
use crate::storage::{EXTERNAL_SLOT_ID, EXTERNAL_UNIT_ID};
use crate::sync::StateSynchronizer;

pub struct CommandDispatcher {
    sync: Arc<StateSynchronizer>,
}

impl CommandDispatcher {
    pub fn new(sync: Arc<StateSynchronizer>) -> Self {
        Self { sync }
    }

    /// Publish a raw document on the request topic.
    pub async fn publish(&self, document: &Value) -> bool {
        self.sync.publisher().publish(document).await
    }

    /// Validate and publish a command.
    pub async fn send(&self, command: PrinterCommand) -> Result<bool> {
        command.validate()?;
        let sent = self.publish(&command.to_json()).await;
        if sent {
            info!(command = command.name(), "command sent");
        }
        Ok(sent)
    }

    async fn send_checked(&self, command: PrinterCommand) -> bool {
        // only for commands whose parameters are valid by construction
        self.send(command).await.unwrap_or(false)
    }

    pub async fn send_line(&self, line: &str) -> Result<bool> {
        self.send_lines(&[line]).await
    }

    /// Send G-code lines as one payload. Any invalid line rejects the whole
    /// batch.
    pub async fn send_lines<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<bool> {
        validate_lines(lines)?;
        let joined = lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
        debug!(lines = lines.len(), "sending G-code");
        self.send(PrinterCommand::GcodeLine(joined)).await
    }

    /// Full refresh request, bypassing the throttle.
    pub async fn push_all(&self) -> bool {
        self.sync.request_refresh().await
    }

    pub async fn start_print(&self, job: StartPrintJob) -> bool {
        self.send_checked(PrinterCommand::StartPrint(job)).await
    }

    pub async fn stop_print(&self) -> bool {
        self.send_checked(PrinterCommand::Stop).await
    }

    async fn gcode_state(&self) -> Result<GcodeState> {
        let raw = self.sync.read(ReportKey::GcodeState, Value::Null).await?;
        Ok(GcodeState::from_value(&raw))
    }

    /// Pause the job. Already paused counts as success without publishing.
    pub async fn pause_print(&self) -> Result<bool> {
        if self.gcode_state().await? == GcodeState::Pause {
            debug!("already paused");
            return Ok(true);
        }
        self.send(PrinterCommand::Pause).await
    }

    /// Resume the job. Already running counts as success without publishing.
    pub async fn resume_print(&self) -> Result<bool> {
        if self.gcode_state().await? == GcodeState::Running {
            debug!("already running");
            return Ok(true);
        }
        self.send(PrinterCommand::Resume).await
    }

    pub async fn skip_objects(&self, ids: Vec<i64>) -> bool {
        self.send_checked(PrinterCommand::SkipObjects(ids)).await
    }

    pub async fn set_light(&self, mode: LightMode) -> bool {
        self.send_checked(PrinterCommand::Light(mode)).await
    }

    pub async fn turn_light_on(&self) -> bool {
        self.set_light(LightMode::On).await
    }

    pub async fn turn_light_off(&self) -> bool {
        self.set_light(LightMode::Off).await
    }

    /// Describe the material in a slot. `color` is `RRGGBB`.
    pub async fn set_filament(
        &self,
        setting: FilamentSetting,
        color: &str,
        unit: u32,
        slot: u32,
    ) -> Result<bool> {
        self.send(PrinterCommand::FilamentSetting {
            unit,
            slot,
            setting,
            color: color.to_string(),
        })
        .await
    }

    pub async fn set_external_filament(&self, setting: FilamentSetting, color: &str) -> Result<bool> {
        self.set_filament(setting, color, EXTERNAL_UNIT_ID, EXTERNAL_SLOT_ID)
            .await
    }

    pub async fn load_filament(&self) -> bool {
        self.send_checked(PrinterCommand::ChangeFilament { target: LOAD_TARGET })
            .await
    }

    pub async fn unload_filament(&self) -> bool {
        self.send_checked(PrinterCommand::ChangeFilament { target: UNLOAD_TARGET })
            .await
    }

    /// Continue a filament load or unload waiting on the user.
    pub async fn resume_filament_action(&self) -> bool {
        self.send_checked(PrinterCommand::ResumeFilamentAction).await
    }

    pub async fn calibrate(&self, options: CalibrationOptions) -> bool {
        self.send_checked(PrinterCommand::Calibration(options)).await
    }

    pub async fn set_print_speed(&self, level: SpeedLevel) -> bool {
        self.send_checked(PrinterCommand::PrintSpeed(level)).await
    }

    /// Numeric variant of [`set_print_speed`](Self::set_print_speed), 1 to 4.
    pub async fn set_print_speed_level(&self, level: i64) -> Result<bool> {
        let level = SpeedLevel::from_level(level)?;
        Ok(self.set_print_speed(level).await)
    }

    pub async fn set_auto_step_recovery(&self, enabled: bool) -> bool {
        self.send_checked(PrinterCommand::AutoRecovery(enabled)).await
    }

    pub async fn set_fan_speed(&self, fan: Fan, speed: FanSpeed) -> Result<bool> {
        let duty = speed.duty()?;
        self.send_line(&format!("M106 P{} S{}", fan.index(), duty))
            .await
    }

    pub async fn set_part_fan_speed(&self, speed: FanSpeed) -> Result<bool> {
        self.set_fan_speed(Fan::Part, speed).await
    }

    pub async fn set_aux_fan_speed(&self, speed: FanSpeed) -> Result<bool> {
        self.set_fan_speed(Fan::Aux, speed).await
    }

    pub async fn set_chamber_fan_speed(&self, speed: FanSpeed) -> Result<bool> {
        self.set_fan_speed(Fan::Chamber, speed).await
    }

    pub async fn set_bed_temperature(&self, temperature: i64) -> Result<bool> {
        self.send_line(&format!("M140 S{temperature}")).await
    }

    pub async fn set_nozzle_temperature(&self, temperature: i64) -> Result<bool> {
        self.send_line(&format!("M104 S{temperature}")).await
    }

    pub async fn auto_home(&self) -> Result<bool> {
        self.send_line("G28").await
    }

    /// Absolute Z position. 0 puts the bed at the nozzle tip.
    pub async fn set_bed_height(&self, height: i64) -> Result<bool> {
        self.send_lines(&["G90".to_string(), format!("G0 Z{height}")])
            .await
    }
}
