use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulationError {
    /// The subject resolved to no devices after filtering; nothing to simulate.
    #[error("no devices found for subject {subject_id}")]
    NoDevicesFound { subject_id: String },

    #[error("config fetch failed: {0}")]
    ConfigFetch(String),

    /// The ingestion endpoint answered with a non-success status.
    #[error("emission rejected with status {status}")]
    Emission { status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
