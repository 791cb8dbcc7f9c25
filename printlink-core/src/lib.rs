//! LAN control of a networked 3D printer over MQTT.
//!
//! Reports pushed by the printer are merged into one snapshot owned by the
//! [`StateSynchronizer`]. [`StatusReader`] projects that snapshot into typed
//! values and [`CommandDispatcher`] validates and publishes commands.
//! [`Printer`] wires the three to an [`MqttTransport`].
//!
//! ```no_run
//! use printlink_core::{ClientConfig, Printer};
//! use std::time::Duration;
//!
//! # async fn demo() -> printlink_core::Result<()> {
//! let printer = Printer::new(ClientConfig::new("192.168.1.20", "12345678", "01S00A000000000"))?;
//! printer.connect()?;
//! if printer.wait_until_ready(Duration::from_secs(10)).await {
//!     println!("bed at {} °C", printer.status().bed_temperature().await?);
//!     printer.commands().turn_light_on().await;
//! }
//! printer.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod accessors;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filament;
pub mod gcode;
pub mod health;
pub mod models;
pub mod mqtt;
pub mod printer;
pub mod state;
pub mod status;
pub mod storage;
pub mod sync;

pub use accessors::{StatusExport, StatusReader};
pub use commands::{
    BedType, CalibrationOptions, Fan, FanSpeed, LightMode, PrinterCommand, SpeedLevel,
    StartPrintJob,
};
pub use config::{load_config, load_config_from, save_config, ClientConfig};
pub use dispatch::CommandDispatcher;
pub use error::{PrinterError, Result};
pub use filament::{FilamentPreset, FilamentSetting, MaterialSlot, TempRange};
pub use gcode::{is_valid_gcode, validate_lines};
pub use health::{LinkHealth, LinkReport, LinkStatus};
pub use models::{ReportKey, Snapshot};
pub use mqtt::{LinkHandler, MqttTransport, Transport};
pub use printer::{FileTransfer, FrameSource, Printer};
pub use status::{GcodeState, NozzleType, PrintStage, Reading};
pub use storage::{StorageHub, StorageUnit};
pub use sync::{Publisher, RefreshThrottle, StateSynchronizer};
