//! Multi-unit filament storage hub parsed from the `ams` report fragment.
//!
//! Parsing is total replacement: every call builds a fresh hub, so a partial
//! report about one unit never leaves stale slots from an earlier layout.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::filament::MaterialSlot;
use crate::models::{lenient_f64, lenient_i64};

/// Unit id addressing the manually fed external slot.
pub const EXTERNAL_UNIT_ID: u32 = 255;
/// Slot id addressing the manually fed external slot.
pub const EXTERNAL_SLOT_ID: u32 = 254;

/// One storage unit and the slots that currently hold material.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageUnit {
    pub humidity: i64,
    pub temperature: f64,
    /// Slot index to material. Empty slots are not present.
    pub slots: BTreeMap<u32, MaterialSlot>,
}

impl StorageUnit {
    pub fn slot(&self, index: u32) -> Option<&MaterialSlot> {
        self.slots.get(&index)
    }

    fn from_fragment(fragment: &Value) -> Self {
        let mut unit = Self {
            humidity: fragment.get("humidity").and_then(lenient_i64).unwrap_or(0),
            temperature: fragment.get("temp").and_then(lenient_f64).unwrap_or(0.0),
            slots: BTreeMap::new(),
        };

        let trays = fragment.get("tray").and_then(Value::as_array);
        for (position, tray) in trays.into_iter().flatten().enumerate() {
            let index = fragment_id(tray, position, "slot");
            if let Some(slot) = MaterialSlot::from_fragment(tray) {
                unit.slots.insert(index, slot);
            }
        }
        unit
    }
}

/// Every storage unit attached to the printer, keyed by unit id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageHub {
    units: BTreeMap<u32, StorageUnit>,
}

impl StorageHub {
    /// Build a hub from the `ams` fragment.
    ///
    /// An absent fragment or a zero `ams_exist_bits` means no storage hardware
    /// is attached, which yields an empty hub.
    pub fn parse(fragment: Option<&Value>) -> Self {
        let mut hub = Self::default();
        let Some(fragment) = fragment else {
            return hub;
        };
        if !units_attached(fragment.get("ams_exist_bits")) {
            return hub;
        }

        let units = fragment.get("ams").and_then(Value::as_array);
        for (position, unit) in units.into_iter().flatten().enumerate() {
            let id = fragment_id(unit, position, "unit");
            hub.units.insert(id, StorageUnit::from_fragment(unit));
        }
        hub
    }

    pub fn unit(&self, id: u32) -> Option<&StorageUnit> {
        self.units.get(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = (u32, &StorageUnit)> {
        self.units.iter().map(|(id, unit)| (*id, unit))
    }

    /// Material in `slot` of `unit`, if any.
    pub fn slot(&self, unit: u32, slot: u32) -> Option<&MaterialSlot> {
        self.unit(unit).and_then(|u| u.slot(slot))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Parse the external slot from the `vt_tray` fragment.
pub fn parse_external_slot(fragment: Option<&Value>) -> Option<MaterialSlot> {
    fragment.and_then(MaterialSlot::from_fragment)
}

/// `ams_exist_bits` is a hex bitmask string; numbers are tolerated.
fn units_attached(bits: Option<&Value>) -> bool {
    match bits {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => {
            let s = s.trim();
            match u64::from_str_radix(s, 16) {
                Ok(mask) => mask != 0,
                Err(_) => !s.is_empty(),
            }
        }
        Some(other) => lenient_i64(other).map(|mask| mask != 0).unwrap_or(false),
    }
}

// Falls back to list position when the id is missing or unusable. Reports
// have always listed units and trays in id order so far.
fn fragment_id(fragment: &Value, position: usize, what: &str) -> u32 {
    let fallback = u32::try_from(position).unwrap_or(u32::MAX);
    match fragment.get("id") {
        None | Some(Value::Null) => fallback,
        Some(raw) => match lenient_i64(raw).and_then(|id| u32::try_from(id).ok()) {
            Some(id) => id,
            None => {
                warn!("unusable {what} id {raw}, using position {position}");
                fallback
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tray(id: &str, material: &str) -> Value {
        json!({
            "id": id,
            "tray_info_idx": material,
            "tray_type": "PLA",
            "tray_color": "00AE42FF",
            "nozzle_temp_min": "190",
            "nozzle_temp_max": "230"
        })
    }

    #[test]
    fn zero_bitmask_means_no_hardware() {
        assert!(StorageHub::parse(None).is_empty());
        let fragment = json!({"ams_exist_bits": "0", "ams": [{"id": "0", "tray": []}]});
        assert!(StorageHub::parse(Some(&fragment)).is_empty());
        let fragment = json!({"ams_exist_bits": 0, "ams": [{"id": "0"}]});
        assert!(StorageHub::parse(Some(&fragment)).is_empty());
        let fragment = json!({"ams": [{"id": "0"}]});
        assert!(StorageHub::parse(Some(&fragment)).is_empty());
    }

    #[test]
    fn empty_material_id_leaves_unit_without_slots() {
        let fragment = json!({
            "ams_exist_bits": "1",
            "ams": [{"id": "0", "humidity": "4", "temp": "23.5", "tray": [tray("0", "")]}]
        });
        let hub = StorageHub::parse(Some(&fragment));

        let unit = hub.unit(0).unwrap();
        assert_eq!(unit.humidity, 4);
        assert_eq!(unit.temperature, 23.5);
        assert!(unit.slots.is_empty());
    }

    #[test]
    fn populated_slot_is_parsed() {
        let fragment = json!({
            "ams_exist_bits": "1",
            "ams": [{"id": "0", "tray": [tray("0", ""), tray("1", "GFA00")]}]
        });
        let hub = StorageHub::parse(Some(&fragment));

        let slot = hub.slot(0, 1).unwrap();
        assert_eq!(slot.material_id, "GFA00");
        assert_eq!(slot.color, "00AE42FF");
        assert_eq!(slot.nozzle_temp.max, 230);
        assert!(hub.slot(0, 0).is_none());
    }

    #[test]
    fn missing_ids_fall_back_to_position() {
        let fragment = json!({
            "ams_exist_bits": "3",
            "ams": [
                {"tray": [{"tray_info_idx": "GFL99"}]},
                {"id": "x", "tray": [{}, {"tray_info_idx": "GFG99"}]}
            ]
        });
        let hub = StorageHub::parse(Some(&fragment));

        assert_eq!(hub.len(), 2);
        assert_eq!(hub.slot(0, 0).unwrap().material_id, "GFL99");
        assert_eq!(hub.slot(1, 1).unwrap().material_id, "GFG99");
    }

    #[test]
    fn every_parse_replaces_the_previous_layout() {
        let first = json!({
            "ams_exist_bits": "3",
            "ams": [{"id": "0", "tray": [tray("0", "GFL99")]}, {"id": "1"}]
        });
        let second = json!({"ams_exist_bits": "1", "ams": [{"id": "0", "tray": []}]});

        assert_eq!(StorageHub::parse(Some(&first)).len(), 2);
        let hub = StorageHub::parse(Some(&second));
        assert_eq!(hub.len(), 1);
        assert!(hub.slot(0, 0).is_none());
    }

    #[test]
    fn external_slot_uses_same_rule() {
        assert!(parse_external_slot(None).is_none());
        assert!(parse_external_slot(Some(&json!({"id": "254", "tray_info_idx": ""}))).is_none());
        let slot = parse_external_slot(Some(&tray("254", "GFB99"))).unwrap();
        assert_eq!(slot.material_id, "GFB99");
    }
}
