//! Filament materials and per-slot material descriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PrinterError, Result};
use crate::models::{lenient_f64, lenient_i64, lenient_string};

/// Valid nozzle temperature range for a material, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempRange {
    pub min: u32,
    pub max: u32,
}

impl TempRange {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min > max {
            return Err(PrinterError::InvalidCommand(format!(
                "nozzle temperature range {min}..{max} is inverted"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, temperature: u32) -> bool {
        (self.min..=self.max).contains(&temperature)
    }
}

/// Material settings pushed to a slot with the filament-setting command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilamentSetting {
    /// Material catalogue id (`tray_info_idx`), e.g. `GFL99`.
    pub material_id: String,
    /// Material family (`tray_type`), e.g. `PLA`.
    pub material_type: String,
    pub nozzle_temp: TempRange,
}

impl FilamentSetting {
    pub fn custom(
        material_id: impl Into<String>,
        material_type: impl Into<String>,
        nozzle_temp: TempRange,
    ) -> Result<Self> {
        let material_id = material_id.into();
        if material_id.trim().is_empty() {
            return Err(PrinterError::InvalidCommand("material id is empty".into()));
        }
        Ok(Self {
            material_id,
            material_type: material_type.into(),
            nozzle_temp,
        })
    }
}

macro_rules! filament_presets {
    ($($variant:ident => ($id:literal, $min:literal, $max:literal, $kind:literal),)*) => {
        /// Catalogue of common materials with their firmware ids.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum FilamentPreset {
            $($variant,)*
        }

        impl FilamentPreset {
            pub const ALL: &'static [FilamentPreset] = &[$(Self::$variant,)*];

            pub fn setting(&self) -> FilamentSetting {
                match self {
                    $(Self::$variant => FilamentSetting {
                        material_id: $id.to_string(),
                        material_type: $kind.to_string(),
                        nozzle_temp: TempRange { min: $min, max: $max },
                    },)*
                }
            }

            pub fn material_id(&self) -> &'static str {
                match self {
                    $(Self::$variant => $id,)*
                }
            }
        }
    };
}

filament_presets! {
    PolylitePla => ("GFL00", 190, 250, "PLA"),
    PolyterraPla => ("GFL01", 190, 250, "PLA"),
    BambuAbs => ("GFB00", 240, 270, "ABS"),
    BambuPaCf => ("GFN03", 270, 300, "PA-CF"),
    BambuPc => ("GFC00", 260, 280, "PC"),
    BambuPlaBasic => ("GFA00", 190, 250, "PLA"),
    BambuPlaMatte => ("GFA01", 190, 250, "PLA"),
    SupportG => ("GFS01", 190, 250, "PA-S"),
    SupportW => ("GFS00", 190, 250, "PLA-S"),
    BambuTpu95a => ("GFU01", 200, 250, "TPU"),
    Abs => ("GFB99", 240, 270, "ABS"),
    Asa => ("GFB98", 240, 270, "ASA"),
    Pa => ("GFN99", 270, 300, "PA"),
    PaCf => ("GFN98", 270, 300, "PA"),
    Pc => ("GFC99", 260, 280, "PC"),
    Petg => ("GFG99", 220, 260, "PETG"),
    Pla => ("GFL99", 190, 250, "PLA"),
    PlaCf => ("GFL98", 190, 250, "PLA"),
    Pva => ("GFS99", 190, 250, "PVA"),
    Tpu => ("GFU99", 200, 250, "TPU"),
}

impl FilamentPreset {
    /// Look up a preset by its catalogue id.
    pub fn from_material_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.material_id() == id)
    }
}

/// Material loaded in one storage slot, as last reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialSlot {
    pub material_id: String,
    pub material_type: String,
    pub sub_brand: Option<String>,
    /// `RRGGBBAA` hex as reported.
    pub color: String,
    pub nozzle_temp: TempRange,
    /// Remaining filament in percent; negative when the unit cannot tell.
    pub remaining: Option<i64>,
    /// Pressure advance factor.
    pub k: Option<f64>,
}

impl MaterialSlot {
    /// Build a slot from a per-slot report fragment.
    ///
    /// Returns `None` when the fragment carries no material id: the slot is
    /// physically empty. Emptiness is judged by `tray_info_idx`, not by the
    /// slot's `n` field.
    pub fn from_fragment(fragment: &Value) -> Option<Self> {
        let material_id = fragment
            .get("tray_info_idx")
            .and_then(lenient_string)
            .filter(|id| !id.trim().is_empty())?;

        let text = |key: &str| fragment.get(key).and_then(lenient_string);
        let temp = |key: &str| {
            fragment
                .get(key)
                .and_then(lenient_i64)
                .and_then(|t| u32::try_from(t).ok())
                .unwrap_or(0)
        };

        Some(Self {
            material_id,
            material_type: text("tray_type").unwrap_or_default(),
            sub_brand: text("tray_sub_brands").filter(|s| !s.is_empty()),
            color: text("tray_color").unwrap_or_default(),
            nozzle_temp: TempRange {
                min: temp("nozzle_temp_min"),
                max: temp("nozzle_temp_max"),
            },
            remaining: fragment.get("remain").and_then(lenient_i64),
            k: fragment.get("k").and_then(lenient_f64),
        })
    }

    pub fn preset(&self) -> Option<FilamentPreset> {
        FilamentPreset::from_material_id(&self.material_id)
    }
}
