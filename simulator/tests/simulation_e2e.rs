use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sensor_simulator::{
    Collaborators, EmissionPayload, Emitter, EngineSettings, Reading, Result, SimulationRegistry, StaticConfigSource,
};

#[derive(Default)]
struct CapturingEmitter {
    sent: Mutex<Vec<(EmissionPayload, String)>>,
}

impl CapturingEmitter {
    fn sent_for(&self, hardware_id: &str) -> Vec<(EmissionPayload, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(payload, _)| payload.device_id == hardware_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Emitter for CapturingEmitter {
    async fn emit(&self, payload: &EmissionPayload, credential: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((payload.clone(), credential.to_string()));
        Ok(())
    }
}

fn fixture_source() -> StaticConfigSource {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/subject_s1.json");
    StaticConfigSource::from_file(&path).unwrap()
}

fn registry(emitter: Arc<CapturingEmitter>) -> SimulationRegistry {
    SimulationRegistry::new(Collaborators {
        source: Arc::new(fixture_source()),
        emitter,
        settings: EngineSettings::default(),
    })
}

#[tokio::test(start_paused = true)]
async fn subject_session_emits_on_schedule() {
    let emitter = Arc::new(CapturingEmitter::default());
    let registry = registry(Arc::clone(&emitter));

    let session_id = registry.start_simulation("S1", None).await.unwrap();

    let mut streams = registry.streams(session_id).unwrap();
    streams.sort_by(|a, b| a.key.data_type.cmp(&b.key.data_type));
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].key.data_type, "gps");
    assert_eq!(streams[0].interval, Duration::from_secs(1_800));
    assert!(streams[0].uses_movement);
    assert_eq!(streams[1].key.data_type, "heart_rate");
    assert_eq!(streams[1].interval, Duration::from_secs(21_600));
    assert!(!streams[1].uses_movement);

    // Firings at 0, 1800, 3600 and 5400 seconds.
    tokio::time::sleep(Duration::from_secs(7_000)).await;

    let heart = emitter.sent_for("KT-HR-01");
    assert_eq!(heart.len(), 1);
    let (payload, credential) = &heart[0];
    assert_eq!(credential, "hr-secret");
    assert_eq!(payload.data_type, "heart_rate");
    assert_eq!(payload.unit.as_deref(), Some("bpm"));
    match payload.value {
        Reading::Number(bpm) => assert!((60.0..=100.0).contains(&bpm)),
        ref other => panic!("unexpected heart rate reading {other:?}"),
    }

    let gps = emitter.sent_for("KT-GPS-01");
    assert_eq!(gps.len(), 4);
    for (payload, credential) in &gps {
        assert_eq!(credential, "gps-secret");
        assert_eq!(payload.unit, None);
        let Reading::Location(location) = &payload.value else {
            panic!("unexpected gps reading {:?}", payload.value);
        };
        // Between or around the two active places, never the inactive one.
        assert!((28.60..=28.67).contains(&location.latitude), "{location:?}");
        assert!((77.20..=77.22).contains(&location.longitude), "{location:?}");
        assert!((5.0..=25.0).contains(&location.accuracy));
    }

    assert!(emitter.sent_for("KT-XX-01").is_empty());

    let stats = registry.statistics(session_id).unwrap();
    assert_eq!(stats.total_generated, 5);
    assert_eq!(stats.total_succeeded, 5);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.device("dev-gps").unwrap().succeeded, 4);
    assert_eq!(stats.data_type("heart_rate").unwrap().total, 1);

    assert!(registry.stop_simulation(session_id));
    assert!(!registry.is_running(session_id));

    tokio::time::sleep(Duration::from_secs(86_400)).await;
    assert_eq!(emitter.sent_for("KT-GPS-01").len(), 4);
    assert_eq!(registry.statistics(session_id).unwrap().total_generated, 5);
}

#[tokio::test(start_paused = true)]
async fn device_filter_and_restart() {
    let emitter = Arc::new(CapturingEmitter::default());
    let registry = registry(Arc::clone(&emitter));

    let only_hr = vec!["dev-hr".to_string()];
    let first = registry.start_simulation("S1", Some(&only_hr)).await.unwrap();
    assert_eq!(registry.streams(first).unwrap().len(), 1);

    let second = registry.start_simulation("S1", None).await.unwrap();
    assert!(!registry.is_running(first));
    assert_eq!(registry.session_for_subject("S1"), Some(second));
    assert_eq!(registry.active_sessions().len(), 1);

    let other = registry.start_simulation("S2", None).await.unwrap();
    assert_eq!(registry.active_sessions().len(), 2);

    registry.shutdown().await;
    assert!(!registry.is_running(second));
    assert!(!registry.is_running(other));
    assert!(registry.statistics(first).is_some());
}
