use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::telemetry::{AlertPayload, TelemetryRecord};

#[derive(Debug, Clone)]
struct VehicleEntry {
    record: TelemetryRecord,
    updated_at: Instant,
}

/// Aggregates over the cache at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub active_vehicles: usize,
    /// Mean speed over cached vehicles, 0 when there are none.
    pub avg_speed: f64,
    pub critical_alerts: usize,
    /// Newest first.
    pub recent_alerts: Vec<AlertPayload>,
}

/// Latest record per vehicle plus a fixed-capacity alert ring.
///
/// Vehicle age is measured from when this process received the record, so a
/// producer with a skewed clock cannot pin or instantly expire entries.
#[derive(Debug)]
pub struct RecencyCache {
    vehicles: HashMap<String, VehicleEntry>,
    alerts: VecDeque<AlertPayload>,
    max_alerts: usize,
    max_vehicle_age: Duration,
}

impl RecencyCache {
    pub fn new(max_alerts: usize, max_vehicle_age: Duration) -> Self {
        Self {
            vehicles: HashMap::new(),
            alerts: VecDeque::with_capacity(max_alerts),
            max_alerts,
            max_vehicle_age,
        }
    }

    pub fn upsert_vehicle(&mut self, record: TelemetryRecord) {
        self.upsert_vehicle_at(record, Instant::now());
    }

    pub fn upsert_vehicle_at(&mut self, record: TelemetryRecord, now: Instant) {
        self.vehicles.insert(
            record.vin.clone(),
            VehicleEntry {
                record,
                updated_at: now,
            },
        );
    }

    /// Pushes an alert to the front, dropping the oldest past capacity.
    pub fn push_alert(&mut self, alert: AlertPayload) {
        if self.max_alerts == 0 {
            return;
        }
        self.alerts.push_front(alert);
        self.alerts.truncate(self.max_alerts);
    }

    /// Evicts vehicles older than the configured age. Returns how many.
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let before = self.vehicles.len();
        let max_age = self.max_vehicle_age;
        self.vehicles
            .retain(|_, entry| now.saturating_duration_since(entry.updated_at) <= max_age);
        before - self.vehicles.len()
    }

    pub fn vehicle(&self, vin: &str) -> Option<&TelemetryRecord> {
        self.vehicles.get(vin).map(|e| &e.record)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.vehicles.values().map(|e| &e.record)
    }

    /// Newest first.
    pub fn alerts(&self) -> impl Iterator<Item = &AlertPayload> {
        self.alerts.iter()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn max_alerts(&self) -> usize {
        self.max_alerts
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let active_vehicles = self.vehicles.len();
        let avg_speed = if active_vehicles == 0 {
            0.0
        } else {
            self.vehicles().map(|r| r.speed).sum::<f64>() / active_vehicles as f64
        };

        CacheSnapshot {
            active_vehicles,
            avg_speed,
            critical_alerts: self.alerts.iter().filter(|a| a.is_critical()).count(),
            recent_alerts: self.alerts.iter().cloned().collect(),
        }
    }
}
