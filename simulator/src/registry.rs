//! Control plane over running simulations.
//!
//! The registry indexes sessions by id and by subject, and guarantees that a
//! subject has at most one running session: a new start for a subject stops
//! the previous one first. Starts for the same subject are serialized.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SimulationError};
use crate::scheduler::{Collaborators, EmissionScheduler, StreamInfo};
use crate::session::{SessionSummary, SimulationSession};
use crate::stats::{SimulationStatistics, StatisticsSnapshot};
use crate::types::Device;

pub struct SimulationRegistry {
    collaborators: Collaborators,
    sessions: DashMap<Uuid, SimulationSession>,
    subjects: DashMap<String, Uuid>,
    // Outlives the session so a final snapshot can be read after stop.
    statistics: DashMap<Uuid, Arc<SimulationStatistics>>,
    start_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SimulationRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            sessions: DashMap::new(),
            subjects: DashMap::new(),
            statistics: DashMap::new(),
            start_locks: DashMap::new(),
        }
    }

    /// Starts simulating `subject_id`, optionally limited to the given internal device ids.
    ///
    /// Any session already running for the subject is stopped first.
    pub async fn start_simulation(&self, subject_id: &str, device_ids: Option<&[String]>) -> Result<Uuid> {
        let lock = Arc::clone(self.start_locks.entry(subject_id.to_string()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(subject_id, device_ids).await
        };
        drop(lock);
        // Forget the lock once no other start for the subject holds it.
        self.start_locks
            .remove_if(subject_id, |_, held| Arc::strong_count(held) == 1);
        result
    }

    async fn start_locked(&self, subject_id: &str, device_ids: Option<&[String]>) -> Result<Uuid> {
        if let Some(existing) = self.session_for_subject(subject_id) {
            warn!(subject_id, existing = %existing, "subject already running, stopping previous session");
            self.stop_simulation(existing);
        }

        let devices = self.resolve_devices(subject_id, device_ids).await;
        if devices.is_empty() {
            warn!(subject_id, "no devices to simulate");
            return Err(SimulationError::NoDevicesFound {
                subject_id: subject_id.to_string(),
            });
        }

        let session_id = Uuid::new_v4();
        let statistics = Arc::new(SimulationStatistics::new(session_id));
        self.statistics.insert(session_id, Arc::clone(&statistics));

        let scheduler =
            EmissionScheduler::start(session_id, subject_id, &devices, &self.collaborators, Arc::clone(&statistics))
                .await;
        let session = SimulationSession::new(subject_id, scheduler, statistics);
        let streams = session.streams().len();
        self.sessions.insert(session_id, session);
        self.subjects.insert(subject_id.to_string(), session_id);

        info!(
            session_id = %session_id,
            subject_id,
            devices = devices.len(),
            streams,
            "simulation started"
        );
        for device in &devices {
            info!(session_id = %session_id, device = %device.name, device_id = %device.hardware_id, "device enrolled");
        }
        Ok(session_id)
    }

    async fn resolve_devices(&self, subject_id: &str, device_ids: Option<&[String]>) -> Vec<Device> {
        let devices = match self.collaborators.source.list_devices(subject_id).await {
            Ok(devices) => devices,
            Err(err) => {
                warn!(subject_id, error = %err, "device lookup failed");
                Vec::new()
            }
        };
        match device_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => devices.into_iter().filter(|d| ids.contains(&d.id)).collect(),
            None => devices,
        }
    }

    /// Stops a session. Returns `false` if it was not running.
    pub fn stop_simulation(&self, session_id: Uuid) -> bool {
        self.stop_inner(session_id).is_some()
    }

    fn stop_inner(&self, session_id: Uuid) -> Option<Vec<JoinHandle<()>>> {
        let Some((_, mut session)) = self.sessions.remove(&session_id) else {
            debug!(session_id = %session_id, "stop requested for unknown session");
            return None;
        };
        self.subjects
            .remove_if(session.subject_id(), |_, current| *current == session_id);
        let handles = session.stop();

        let summary = session.summary();
        let snapshot = session.statistics().snapshot();
        info!(
            session_id = %session_id,
            subject_id = %summary.subject_id,
            state = ?summary.state,
            streams = summary.streams,
            duration_secs = snapshot.elapsed_seconds,
            generated = snapshot.total_generated,
            succeeded = snapshot.total_succeeded,
            failed = snapshot.total_failed,
            success_rate = format!("{:.1}", snapshot.success_rate),
            per_minute = format!("{:.2}", snapshot.data_points_per_minute),
            "simulation stopped"
        );
        Some(handles)
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    pub fn statistics(&self, session_id: Uuid) -> Option<StatisticsSnapshot> {
        self.statistics.get(&session_id).map(|stats| stats.snapshot())
    }

    /// Drops the retained statistics of a stopped session.
    pub fn clear_statistics(&self, session_id: Uuid) -> bool {
        if self.is_running(session_id) {
            return false;
        }
        self.statistics.remove(&session_id).is_some()
    }

    pub fn session_for_subject(&self, subject_id: &str) -> Option<Uuid> {
        self.subjects.get(subject_id).map(|entry| *entry.value())
    }

    pub fn streams(&self, session_id: Uuid) -> Option<Vec<StreamInfo>> {
        self.sessions
            .get(&session_id)
            .map(|session| session.streams().to_vec())
    }

    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.summary()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Stops every session and waits for in-flight firings to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|s| *s.key()).collect();
        let handles: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.stop_inner(id))
            .flatten()
            .collect();
        for result in join_all(handles).await {
            if let Err(err) = result {
                warn!(error = %err, "stream task ended abnormally");
            }
        }
    }
}
