use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FREQUENCY_PER_DAY: u32 = 4;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub backend_url: String,
    pub backend_api_key: Option<String>,
    pub ingest_url: String,
    pub request_timeout_secs: u64,
    pub default_frequency_per_day: u32,
    pub stats_log_interval_secs: u64,
    pub subject_id: Option<String>,
    #[serde(default)]
    pub device_ids: Vec<String>,
    pub fixture_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: "http://localhost:54321".to_string(),
            backend_api_key: None,
            ingest_url: "http://localhost:8000/api/device-ingest".to_string(),
            request_timeout_secs: 10,
            default_frequency_per_day: DEFAULT_FREQUENCY_PER_DAY,
            stats_log_interval_secs: 60,
            subject_id: None,
            device_ids: Vec::new(),
            fixture_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let backend_url = env::var("BACKEND_URL").unwrap_or(defaults.backend_url);
        let backend_api_key = env::var("BACKEND_API_KEY").ok();
        let ingest_url = env::var("INGEST_URL").unwrap_or(defaults.ingest_url);

        let request_timeout_secs = get_env_var_u64("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);
        let default_frequency_per_day = get_env_var_u64("DEFAULT_FREQUENCY_PER_DAY", DEFAULT_FREQUENCY_PER_DAY as u64)
            .clamp(1, u32::MAX as u64) as u32;
        let stats_log_interval_secs = get_env_var_u64("STATS_LOG_INTERVAL_SECS", defaults.stats_log_interval_secs);

        let subject_id = env::var("SUBJECT_ID").ok().filter(|s| !s.trim().is_empty());
        let device_ids = env::var("DEVICE_IDS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();
        let fixture_path = env::var("FIXTURE_PATH").ok().map(PathBuf::from);

        Ok(Config {
            backend_url,
            backend_api_key,
            ingest_url,
            request_timeout_secs,
            default_frequency_per_day,
            stats_log_interval_secs,
            subject_id,
            device_ids,
            fixture_path,
        })
    }

    fn get_config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join("simulator_config.json")
    }

    /// Reads `simulator_config.json` from `CONFIG_DIR`, if present.
    pub fn load_from_file() -> Result<Option<Self>> {
        let config_file_path = Self::get_config_file_path();
        if !config_file_path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&config_file_path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            default_frequency_per_day: self.default_frequency_per_day.max(1),
            send_timeout: self.request_timeout(),
        }
    }
}

/// Knobs the scheduler needs, split off so tests can build them directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub default_frequency_per_day: u32,
    pub send_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Config::default().settings()
    }
}

fn get_env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
