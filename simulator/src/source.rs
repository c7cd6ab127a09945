//! Where devices, data type configs and geofence places come from.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog;
use crate::error::{Result, SimulationError};
use crate::simulate;
use crate::types::{
    is_location_type, DataTypeConfig, Device, GeoBounds, GeofencePlace, NumericRange, ValueSpec,
};

#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn list_devices(&self, subject_id: &str) -> Result<Vec<Device>>;
    /// `device_id` is the internal id, not the hardware id.
    async fn list_data_type_configs(&self, device_id: &str) -> Result<Vec<DataTypeConfig>>;
    async fn list_geofence_places(&self, subject_id: &str) -> Result<Vec<GeofencePlace>>;
}

/// In-memory source, loadable from a JSON fixture.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticConfigSource {
    #[serde(default)]
    devices: Vec<Device>,
    /// Keyed by internal device id.
    #[serde(default)]
    data_types: HashMap<String, Vec<DataTypeConfig>>,
    #[serde(default)]
    places: Vec<GeofencePlace>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SimulationError::ConfigFetch(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn with_device(mut self, device: Device, configs: Vec<DataTypeConfig>) -> Self {
        self.data_types.entry(device.id.clone()).or_default().extend(configs);
        self.devices.push(device);
        self
    }

    pub fn with_place(mut self, place: GeofencePlace) -> Self {
        self.places.push(place);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn list_devices(&self, subject_id: &str) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn list_data_type_configs(&self, device_id: &str) -> Result<Vec<DataTypeConfig>> {
        Ok(self.data_types.get(device_id).cloned().unwrap_or_default())
    }

    async fn list_geofence_places(&self, subject_id: &str) -> Result<Vec<GeofencePlace>> {
        Ok(self
            .places
            .iter()
            .filter(|p| p.subject_id == subject_id)
            .cloned()
            .collect())
    }
}

/// Reads the fleet layout from a PostgREST-style backend.
pub struct BackendConfigSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Deserialize)]
struct DeviceTypeRef {
    device_type: String,
}

#[derive(Deserialize)]
struct DeviceTypeRow {
    id: String,
    data_frequency_per_day: Option<i64>,
}

#[derive(Deserialize)]
struct ConfigRow {
    data_type: String,
    display_name: Option<String>,
    unit: Option<String>,
    sample_data_config: Option<Value>,
}

impl BackendConfigSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let rows = fetch_rows::<T>(request)
            .await
            .map_err(|e| SimulationError::ConfigFetch(format!("{table}: {e}")))?;
        debug!(table, rows = rows.len(), "backend query");
        Ok(rows)
    }

    /// Accepts either a subject id or the id of the user that owns one.
    async fn resolve_subject(&self, subject_id: &str) -> Result<String> {
        let rows: Vec<IdRow> = self
            .get("subjects", &[("user_id", eq(subject_id)), ("select", "id".into())])
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.id)
            .unwrap_or_else(|| subject_id.to_string()))
    }
}

async fn fetch_rows<T: DeserializeOwned>(request: RequestBuilder) -> reqwest::Result<Vec<T>> {
    request.send().await?.error_for_status()?.json().await
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl ConfigSource for BackendConfigSource {
    async fn list_devices(&self, subject_id: &str) -> Result<Vec<Device>> {
        let subject = self.resolve_subject(subject_id).await?;
        self.get("devices", &[("subject_id", eq(&subject))]).await
    }

    async fn list_data_type_configs(&self, device_id: &str) -> Result<Vec<DataTypeConfig>> {
        let refs: Vec<DeviceTypeRef> = self
            .get("devices", &[("id", eq(device_id)), ("select", "device_type".into())])
            .await?;
        let Some(device_type) = refs.into_iter().next() else {
            return Ok(Vec::new());
        };

        let types: Vec<DeviceTypeRow> = self
            .get(
                "device_types",
                &[
                    ("code", eq(&device_type.device_type)),
                    ("select", "id,data_frequency_per_day".into()),
                ],
            )
            .await?;
        let Some(device_type) = types.into_iter().next() else {
            return Ok(Vec::new());
        };

        let rows: Vec<ConfigRow> = self
            .get(
                "device_type_data_configs",
                &[("device_type_id", eq(&device_type.id)), ("order", "sort_order".into())],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let spec = parse_sample_config(&row.data_type, row.sample_data_config.as_ref());
                DataTypeConfig {
                    display_name: row.display_name.unwrap_or_else(|| row.data_type.clone()),
                    unit: row.unit.unwrap_or_default(),
                    spec,
                    frequency_per_day: device_type.data_frequency_per_day,
                    data_type: row.data_type,
                }
            })
            .collect())
    }

    async fn list_geofence_places(&self, subject_id: &str) -> Result<Vec<GeofencePlace>> {
        let subject = self.resolve_subject(subject_id).await?;
        self.get(
            "geofence_places",
            &[("subject_id", eq(&subject)), ("is_active", "eq.true".into())],
        )
        .await
    }
}

/// Turns a stored `sample_data_config` into a [`ValueSpec`].
///
/// The column may hold a JSON object or a string containing one. Anything
/// unusable falls back to the built-in catalog entry for the data type.
pub fn parse_sample_config(data_type: &str, raw: Option<&Value>) -> ValueSpec {
    let parsed = match raw {
        Some(Value::String(text)) => serde_json::from_str::<Value>(text).ok(),
        Some(other) => Some(other.clone()),
        None => None,
    };
    let Some(Value::Object(obj)) = parsed else {
        return catalog::default_spec(data_type);
    };

    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "enum" => ValueSpec::Enum {
            values: obj
                .get("values")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        "boolean" => ValueSpec::Enum {
            values: vec![Value::Bool(true), Value::Bool(false)],
        },
        _ if is_location_type(data_type) => ValueSpec::Area(parse_bounds(&obj)),
        _ if kind == "blood_pressure" || data_type == "blood_pressure" => parse_blood_pressure(&obj),
        "random_number" => ValueSpec::Range(parse_range(&obj)),
        _ if obj.contains_key("min") || obj.contains_key("max") => ValueSpec::Range(parse_range(&obj)),
        _ => catalog::default_spec(data_type),
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

fn parse_range(obj: &Map<String, Value>) -> NumericRange {
    NumericRange::new(
        number(obj, "min").unwrap_or(0.0),
        number(obj, "max").unwrap_or(100.0),
        obj.get("precision")
            .and_then(Value::as_u64)
            .map_or(0, |p| p.min(u64::from(simulate::MAX_PRECISION)) as u32),
    )
}

fn parse_bounds(obj: &Map<String, Value>) -> GeoBounds {
    let defaults = GeoBounds::default();
    GeoBounds {
        lat_min: number(obj, "lat_min").unwrap_or(defaults.lat_min),
        lat_max: number(obj, "lat_max").unwrap_or(defaults.lat_max),
        lon_min: number(obj, "lon_min").unwrap_or(defaults.lon_min),
        lon_max: number(obj, "lon_max").unwrap_or(defaults.lon_max),
    }
}

fn parse_blood_pressure(obj: &Map<String, Value>) -> ValueSpec {
    let bounds = |part: &str, default: (i64, i64)| {
        let nested = obj.get(part).and_then(Value::as_object);
        let min = nested
            .and_then(|n| n.get("min"))
            .or_else(|| obj.get(&format!("{part}_min")))
            .and_then(Value::as_f64);
        let max = nested
            .and_then(|n| n.get("max"))
            .or_else(|| obj.get(&format!("{part}_max")))
            .and_then(Value::as_f64);
        (
            min.map_or(default.0, |v| v as i64),
            max.map_or(default.1, |v| v as i64),
        )
    };
    ValueSpec::blood_pressure(bounds("systolic", (110, 130)), bounds("diastolic", (70, 85)))
}
