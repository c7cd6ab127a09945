use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug)]
struct Counter {
    name: String,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Counter {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn snapshot(&self, id: &str) -> CounterSnapshot {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        CounterSnapshot {
            id: id.to_string(),
            name: self.name.clone(),
            succeeded,
            failed,
            total: succeeded + failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

/// Live counters for one session, shared by every stream of that session.
///
/// The generated total is always derived as `succeeded + failed`, so a
/// snapshot can never observe the two disagreeing.
#[derive(Debug)]
pub struct SimulationStatistics {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    last_updated_ms: AtomicI64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    devices: DashMap<String, Counter>,
    data_types: DashMap<String, Counter>,
}

impl SimulationStatistics {
    pub fn new(session_id: Uuid) -> Self {
        let started_at = Utc::now();
        Self {
            session_id,
            started_at,
            last_updated_ms: AtomicI64::new(started_at.timestamp_millis()),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            devices: DashMap::new(),
            data_types: DashMap::new(),
        }
    }

    pub fn record_success(&self, device_id: &str, device_name: &str, data_type: &str, display_name: &str) {
        self.record(Outcome::Success, device_id, device_name, data_type, display_name);
    }

    pub fn record_failure(&self, device_id: &str, device_name: &str, data_type: &str, display_name: &str) {
        self.record(Outcome::Failure, device_id, device_name, data_type, display_name);
    }

    fn record(&self, outcome: Outcome, device_id: &str, device_name: &str, data_type: &str, display_name: &str) {
        let pick = |counter: &Counter| match outcome {
            Outcome::Success => counter.succeeded.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => counter.failed.fetch_add(1, Ordering::Relaxed),
        };

        pick(
            self.devices
                .entry(device_id.to_string())
                .or_insert_with(|| Counter::new(device_name))
                .value(),
        );
        pick(
            self.data_types
                .entry(data_type.to_string())
                .or_insert_with(|| Counter::new(display_name))
                .value(),
        );
        match outcome {
            Outcome::Success => self.succeeded.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        self.last_updated_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn generated(&self) -> u64 {
        self.succeeded() + self.failed()
    }

    pub fn elapsed_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let succeeded = self.succeeded();
        let failed = self.failed();
        let generated = succeeded + failed;
        let elapsed_seconds = self.elapsed_seconds();

        let mut devices: Vec<_> = self.devices.iter().map(|e| e.value().snapshot(e.key())).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        let mut data_types: Vec<_> = self.data_types.iter().map(|e| e.value().snapshot(e.key())).collect();
        data_types.sort_by(|a, b| a.id.cmp(&b.id));

        StatisticsSnapshot {
            session_id: self.session_id,
            started_at: self.started_at,
            last_updated_at: Utc
                .timestamp_millis_opt(self.last_updated_ms.load(Ordering::Relaxed))
                .single()
                .unwrap_or(self.started_at),
            elapsed_seconds,
            total_generated: generated,
            total_succeeded: succeeded,
            total_failed: failed,
            success_rate: success_rate(succeeded, generated),
            data_points_per_minute: per_minute(succeeded, elapsed_seconds),
            devices,
            data_types,
        }
    }
}

pub fn success_rate(succeeded: u64, generated: u64) -> f64 {
    if generated == 0 {
        0.0
    } else {
        succeeded as f64 * 100.0 / generated as f64
    }
}

pub fn per_minute(succeeded: u64, elapsed_seconds: i64) -> f64 {
    if elapsed_seconds <= 0 {
        0.0
    } else {
        succeeded as f64 * 60.0 / elapsed_seconds as f64
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CounterSnapshot {
    pub id: String,
    pub name: String,
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
}

/// Point-in-time copy of a session's statistics, safe to hand to callers.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatisticsSnapshot {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub total_generated: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub success_rate: f64,
    pub data_points_per_minute: f64,
    pub devices: Vec<CounterSnapshot>,
    pub data_types: Vec<CounterSnapshot>,
}

impl StatisticsSnapshot {
    pub fn device(&self, id: &str) -> Option<&CounterSnapshot> {
        self.devices.iter().find(|c| c.id == id)
    }

    pub fn data_type(&self, id: &str) -> Option<&CounterSnapshot> {
        self.data_types.iter().find(|c| c.id == id)
    }
}
