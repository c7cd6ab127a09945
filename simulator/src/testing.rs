//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SimulationError};
use crate::net::Emitter;
use crate::types::{DataTypeConfig, Device, EmissionPayload, GeoBounds, GeofencePlace, NumericRange, ValueSpec};

pub fn device(id: &str, hardware_id: &str) -> Device {
    Device {
        id: id.into(),
        subject_id: "S1".into(),
        name: format!("Device {id}"),
        hardware_id: hardware_id.into(),
        api_key: format!("key-{id}"),
    }
}

pub fn range_config(data_type: &str, frequency_per_day: i64) -> DataTypeConfig {
    DataTypeConfig {
        data_type: data_type.into(),
        display_name: data_type.replace('_', " "),
        unit: "bpm".into(),
        spec: ValueSpec::Range(NumericRange::new(60.0, 100.0, 0)),
        frequency_per_day: Some(frequency_per_day),
    }
}

pub fn gps_config(frequency_per_day: i64) -> DataTypeConfig {
    DataTypeConfig {
        data_type: "gps".into(),
        display_name: "GPS".into(),
        unit: String::new(),
        spec: ValueSpec::Area(GeoBounds::default()),
        frequency_per_day: Some(frequency_per_day),
    }
}

pub fn place(id: &str, latitude: f64, longitude: f64) -> GeofencePlace {
    GeofencePlace {
        id: id.into(),
        subject_id: "S1".into(),
        name: id.into(),
        place_type: "other".into(),
        latitude,
        longitude,
        radius_meters: 100.0,
        is_active: true,
    }
}

/// Lets spawned stream tasks run their pending work under paused time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[derive(Default)]
pub struct RecordingEmitter {
    sent: Mutex<Vec<(EmissionPayload, String)>>,
    fail: bool,
    stall_device: Option<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingEmitter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Never answers for payloads from `hardware_id`.
    pub fn stalling_for(hardware_id: &str) -> Self {
        Self {
            stall_device: Some(hardware_id.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(EmissionPayload, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Emitter for RecordingEmitter {
    async fn emit(&self, payload: &EmissionPayload, credential: &str) -> Result<()> {
        if self.stall_device.as_deref() == Some(payload.device_id.as_str()) {
            std::future::pending::<()>().await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((payload.clone(), credential.to_string()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(SimulationError::Emission { status: 503 })
        } else {
            Ok(())
        }
    }
}
