//! Synthetic sensor data generator for registered wearable devices.
//!
//! A [`SimulationRegistry`] starts one session per subject. Each session runs an
//! independent fixed-rate stream per (device, data type) pair, drawing readings
//! from the configured [`ValueSpec`] or, for location streams with known places,
//! from a [`MovementSimulator`], and posting them through an [`Emitter`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod movement;
pub mod net;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod simulate;
pub mod source;
pub mod stats;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{Config, EngineSettings};
pub use error::{Result, SimulationError};
pub use movement::MovementSimulator;
pub use net::{Emitter, HttpEmitter};
pub use registry::SimulationRegistry;
pub use scheduler::{Collaborators, StreamInfo, StreamKey};
pub use session::{SessionState, SessionSummary};
pub use source::{BackendConfigSource, ConfigSource, StaticConfigSource};
pub use stats::{SimulationStatistics, StatisticsSnapshot};
pub use types::{DataTypeConfig, Device, EmissionPayload, GeofencePlace, Reading, ValueSpec};
