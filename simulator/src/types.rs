use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data types routed through the movement simulator when places are known.
pub const LOCATION_DATA_TYPES: [&str; 2] = ["gps", "location"];

pub fn is_location_type(data_type: &str) -> bool {
    LOCATION_DATA_TYPES.contains(&data_type)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    /// Internal identifier used by the config store.
    pub id: String,
    pub subject_id: String,
    #[serde(rename = "device_name")]
    pub name: String,
    /// Hardware identifier reported to the ingestion endpoint.
    #[serde(rename = "device_id")]
    pub hardware_id: String,
    pub api_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub precision: u32,
}

impl NumericRange {
    pub fn new(min: f64, max: f64, precision: u32) -> Self {
        if min <= max {
            Self { min, max, precision }
        } else {
            Self { min: max, max: min, precision }
        }
    }
}

/// One labelled integer component of a composite reading.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedRange {
    pub name: String,
    pub min: i64,
    pub max: i64,
}

impl NamedRange {
    pub fn new(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            min: min.min(max),
            max: max.max(min),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self {
            lat_min: 28.0,
            lat_max: 29.0,
            lon_min: 77.0,
            lon_max: 78.0,
        }
    }
}

/// How values for a data type are drawn. Decided once when the config is parsed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSpec {
    Range(NumericRange),
    Composite { parts: Vec<NamedRange> },
    Area(GeoBounds),
    Enum { values: Vec<Value> },
}

impl ValueSpec {
    pub fn blood_pressure(systolic: (i64, i64), diastolic: (i64, i64)) -> Self {
        ValueSpec::Composite {
            parts: vec![
                NamedRange::new("systolic", systolic.0, systolic.1),
                NamedRange::new("diastolic", diastolic.0, diastolic.1),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataTypeConfig {
    pub data_type: String,
    pub display_name: String,
    #[serde(default)]
    pub unit: String,
    pub spec: ValueSpec,
    /// Raw frequency as stored; scheduling applies the default policy.
    #[serde(default)]
    pub frequency_per_day: Option<i64>,
}

impl DataTypeConfig {
    pub fn is_location(&self) -> bool {
        is_location_type(&self.data_type)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeofencePlace {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    #[serde(default)]
    pub place_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LocationData {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// A single generated value, serialized as the payload's `value` field.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Choice(Value),
    Composite(BTreeMap<String, i64>),
    Location(LocationData),
}

// Body posted to the ingestion endpoint
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmissionPayload {
    pub device_id: String,
    pub data_type: String,
    pub value: Reading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl EmissionPayload {
    pub fn new(device: &Device, config: &DataTypeConfig, value: Reading) -> Self {
        let unit = config.unit.trim();
        Self {
            device_id: device.hardware_id.clone(),
            data_type: config.data_type.clone(),
            value,
            unit: (!unit.is_empty()).then(|| config.unit.clone()),
        }
    }
}
