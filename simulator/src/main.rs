use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sensor_simulator::{
    BackendConfigSource, Collaborators, Config, ConfigSource, HttpEmitter, SimulationRegistry, StaticConfigSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load_from_file()? {
        Some(config) => config,
        None => Config::from_env()?,
    };
    info!(
        backend_url = %config.backend_url,
        ingest_url = %config.ingest_url,
        fixture = ?config.fixture_path,
        "simulator starting"
    );

    let source: Arc<dyn ConfigSource> = match &config.fixture_path {
        Some(path) => Arc::new(
            StaticConfigSource::from_file(path)
                .with_context(|| format!("failed to load fixture {}", path.display()))?,
        ),
        None => Arc::new(BackendConfigSource::new(
            config.backend_url.clone(),
            config.backend_api_key.clone(),
            config.request_timeout(),
        )?),
    };
    let emitter = Arc::new(HttpEmitter::new(config.ingest_url.clone(), config.request_timeout())?);

    let registry = SimulationRegistry::new(Collaborators {
        source,
        emitter,
        settings: config.settings(),
    });

    let subject_id = config.subject_id.as_deref().context("SUBJECT_ID must be set")?;
    let device_ids = (!config.device_ids.is_empty()).then_some(config.device_ids.as_slice());
    let session_id = registry.start_simulation(subject_id, device_ids).await?;

    let mut stats_interval = time::interval(Duration::from_secs(config.stats_log_interval_secs.max(1)));
    stats_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    stats_interval.tick().await;

    loop {
        tokio::select! {
            _ = stats_interval.tick() => {
                match registry.statistics(session_id) {
                    Some(stats) => info!(
                        session_id = %session_id,
                        generated = stats.total_generated,
                        succeeded = stats.total_succeeded,
                        failed = stats.total_failed,
                        success_rate = format!("{:.1}", stats.success_rate),
                        per_minute = format!("{:.2}", stats.data_points_per_minute),
                        "simulation progress"
                    ),
                    None => warn!(session_id = %session_id, "statistics unavailable"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
                info!("shutdown requested");
                break;
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
