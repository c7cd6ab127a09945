use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::scheduler::{EmissionScheduler, StreamInfo};
use crate::stats::SimulationStatistics;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Stopped,
}

pub struct SimulationSession {
    id: Uuid,
    subject_id: String,
    state: SessionState,
    started_at: DateTime<Utc>,
    scheduler: EmissionScheduler,
    statistics: Arc<SimulationStatistics>,
}

impl SimulationSession {
    pub fn new(subject_id: &str, scheduler: EmissionScheduler, statistics: Arc<SimulationStatistics>) -> Self {
        Self {
            id: statistics.session_id(),
            subject_id: subject_id.to_string(),
            state: SessionState::Running,
            started_at: statistics.started_at(),
            scheduler,
            statistics,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn statistics(&self) -> &Arc<SimulationStatistics> {
        &self.statistics
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            subject_id: self.subject_id.clone(),
            state: self.state,
            started_at: self.started_at,
            streams: self.scheduler.streams().len(),
        }
    }

    pub fn streams(&self) -> &[StreamInfo] {
        self.scheduler.streams()
    }

    pub(crate) fn stop(&mut self) -> Vec<JoinHandle<()>> {
        self.state = SessionState::Stopped;
        self.scheduler.stop()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub subject_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub streams: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::scheduler::Collaborators;
    use crate::source::StaticConfigSource;
    use crate::testing::RecordingEmitter;

    #[tokio::test]
    async fn summary_reflects_stop() {
        let collaborators = Collaborators {
            source: Arc::new(StaticConfigSource::new()),
            emitter: Arc::new(RecordingEmitter::default()),
            settings: EngineSettings::default(),
        };
        let statistics = Arc::new(SimulationStatistics::new(Uuid::new_v4()));
        let scheduler =
            EmissionScheduler::start(statistics.session_id(), "S1", &[], &collaborators, Arc::clone(&statistics)).await;
        let mut session = SimulationSession::new("S1", scheduler, Arc::clone(&statistics));

        let summary = session.summary();
        assert_eq!(summary.session_id, statistics.session_id());
        assert_eq!(summary.started_at, statistics.started_at());
        assert_eq!(summary.state, SessionState::Running);
        assert_eq!(summary.streams, 0);

        assert!(session.stop().is_empty());
        assert_eq!(session.summary().state, SessionState::Stopped);
    }
}
