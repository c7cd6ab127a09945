//! Per-session emission scheduling.
//!
//! Every (device, data type) pair becomes a stream: one tokio task that
//! ticks at a fixed rate derived from the configured frequency, generates a
//! reading and hands it to the [`Emitter`]. Firings of a stream run one at a
//! time; streams never wait on each other.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::SimulationError;
use crate::movement::MovementSimulator;
use crate::net::Emitter;
use crate::simulate;
use crate::source::ConfigSource;
use crate::stats::SimulationStatistics;
use crate::types::{DataTypeConfig, Device, EmissionPayload, GeofencePlace, Reading};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds between firings for a stream emitting `frequency_per_day` times.
pub fn interval_seconds(frequency_per_day: u32) -> u64 {
    (SECONDS_PER_DAY / u64::from(frequency_per_day.max(1))).max(1)
}

/// Missing or non-positive frequencies fall back to `default`.
pub fn effective_frequency(raw: Option<i64>, default: u32) -> u32 {
    match raw {
        Some(f) if f >= 1 => u32::try_from(f).unwrap_or(u32::MAX),
        _ => default.max(1),
    }
}

fn describe_interval(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s => format!("{}h", s / 3_600),
    }
}

/// The external pieces a scheduler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ConfigSource>,
    pub emitter: Arc<dyn Emitter>,
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub device_id: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub key: StreamKey,
    pub interval: Duration,
    pub uses_movement: bool,
}

struct Stream {
    device: Arc<Device>,
    config: DataTypeConfig,
    movement: Option<MovementSimulator>,
}

impl Stream {
    async fn fire(&mut self, emitter: &dyn Emitter, statistics: &SimulationStatistics, send_timeout: Duration) {
        let value = match self.movement.as_mut() {
            Some(movement) => Reading::Location(movement.next_location()),
            None => simulate::generate_value(&self.config.spec),
        };
        let payload = EmissionPayload::new(&self.device, &self.config, value);

        let outcome = match time::timeout(send_timeout, emitter.emit(&payload, &self.device.api_key)).await {
            Ok(result) => result,
            Err(_) => Err(SimulationError::Timeout(send_timeout)),
        };

        let (device, config) = (&self.device, &self.config);
        match outcome {
            Ok(()) => {
                statistics.record_success(&device.id, &device.name, &config.data_type, &config.display_name);
                debug!(
                    device_id = %device.hardware_id,
                    data_type = %config.data_type,
                    value = ?payload.value,
                    "reading sent"
                );
            }
            Err(err) => {
                statistics.record_failure(&device.id, &device.name, &config.data_type, &config.display_name);
                warn!(
                    device_id = %device.hardware_id,
                    device = %device.name,
                    data_type = %config.data_type,
                    error = %err,
                    "reading send failed"
                );
            }
        }
    }
}

async fn run_stream(
    mut stream: Stream,
    interval: Duration,
    emitter: Arc<dyn Emitter>,
    statistics: Arc<SimulationStatistics>,
    token: CancellationToken,
    send_timeout: Duration,
) {
    // First tick completes immediately.
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        stream.fire(emitter.as_ref(), &statistics, send_timeout).await;
    }
    debug!(
        device_id = %stream.device.hardware_id,
        data_type = %stream.config.data_type,
        "stream stopped"
    );
}

/// Owns the streams of one session. Dropping it cancels them.
pub struct EmissionScheduler {
    session_id: Uuid,
    token: CancellationToken,
    streams: Vec<StreamInfo>,
    tasks: Vec<JoinHandle<()>>,
}

impl EmissionScheduler {
    /// Resolves configs and places for `devices` and spawns one task per stream.
    ///
    /// Config lookups that fail are logged and skipped; the scheduler always
    /// starts with whatever could be resolved.
    pub async fn start(
        session_id: Uuid,
        subject_id: &str,
        devices: &[Device],
        collaborators: &Collaborators,
        statistics: Arc<SimulationStatistics>,
    ) -> Self {
        let mut scheduler = Self {
            session_id,
            token: CancellationToken::new(),
            streams: Vec::new(),
            tasks: Vec::new(),
        };

        let places = load_places(collaborators.source.as_ref(), subject_id).await;
        let mut seen = HashSet::new();

        for device in devices {
            let configs = match collaborators.source.list_data_type_configs(&device.id).await {
                Ok(configs) => configs,
                Err(err) => {
                    warn!(device_id = %device.hardware_id, error = %err, "data type lookup failed");
                    continue;
                }
            };
            if configs.is_empty() {
                warn!(device_id = %device.hardware_id, device = %device.name, "no data type configs");
                continue;
            }

            let device = Arc::new(device.clone());
            for config in configs {
                let key = StreamKey {
                    device_id: device.id.clone(),
                    data_type: config.data_type.clone(),
                };
                if !seen.insert(key.clone()) {
                    warn!(device_id = %device.hardware_id, data_type = %key.data_type, "duplicate stream skipped");
                    continue;
                }
                scheduler.spawn_stream(key, Arc::clone(&device), config, &places, collaborators, &statistics);
            }
        }

        info!(
            session_id = %session_id,
            streams = scheduler.streams.len(),
            devices = devices.len(),
            "streams scheduled"
        );
        scheduler
    }

    fn spawn_stream(
        &mut self,
        key: StreamKey,
        device: Arc<Device>,
        config: DataTypeConfig,
        places: &[GeofencePlace],
        collaborators: &Collaborators,
        statistics: &Arc<SimulationStatistics>,
    ) {
        let settings = collaborators.settings;
        if config.frequency_per_day.map_or(true, |f| f < 1) {
            warn!(
                device_id = %device.hardware_id,
                data_type = %config.data_type,
                raw = ?config.frequency_per_day,
                default = settings.default_frequency_per_day,
                "invalid frequency, using default"
            );
        }
        let frequency = effective_frequency(config.frequency_per_day, settings.default_frequency_per_day);
        let interval_secs = interval_seconds(frequency);

        let movement = if config.is_location() {
            let movement = MovementSimulator::new(places.to_vec());
            if movement.is_none() {
                warn!(device_id = %device.hardware_id, "no geofence places, location uses random area");
            }
            movement
        } else {
            None
        };

        info!(
            session_id = %self.session_id,
            device_id = %device.hardware_id,
            device = %device.name,
            data_type = %config.data_type,
            frequency_per_day = frequency,
            every = %describe_interval(interval_secs),
            "scheduling stream"
        );

        let interval = Duration::from_secs(interval_secs);
        self.streams.push(StreamInfo {
            key,
            interval,
            uses_movement: movement.is_some(),
        });

        let stream = Stream {
            device,
            config,
            movement,
        };
        self.tasks.push(tokio::spawn(run_stream(
            stream,
            interval,
            Arc::clone(&collaborators.emitter),
            Arc::clone(statistics),
            self.token.clone(),
            settings.send_timeout,
        )));
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Signals every stream to stop and hands back their join handles.
    ///
    /// Does not wait: an in-flight firing finishes on its own, and no new
    /// firing starts once a stream observes the cancellation.
    pub fn stop(&mut self) -> Vec<JoinHandle<()>> {
        self.token.cancel();
        std::mem::take(&mut self.tasks)
    }
}

impl Drop for EmissionScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn load_places(source: &dyn ConfigSource, subject_id: &str) -> Vec<GeofencePlace> {
    match source.list_geofence_places(subject_id).await {
        Ok(places) => {
            let active: Vec<_> = places.into_iter().filter(|p| p.is_active).collect();
            if active.is_empty() {
                warn!(subject_id, "no geofence places, location streams use random coordinates");
            } else {
                info!(subject_id, places = active.len(), "geofence places loaded");
            }
            active
        }
        Err(err) => {
            warn!(subject_id, error = %err, "geofence lookup failed");
            Vec::new()
        }
    }
}
