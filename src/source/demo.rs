use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

use super::{MessageStream, TelemetrySource};
use crate::broker::message::BrokerMessage;
use crate::telemetry::batch::sensors;
use crate::telemetry::decoder::{batch, encode_batch};
use crate::telemetry::{AlertKind, AlertRecord};
use crate::utils::error::SourceError;

/// Waypoints across San Francisco, `(lat, lon)`.
const ROUTES: [[(f64, f64); 5]; 3] = [
    [
        (37.8199, -122.4783),
        (37.8086, -122.4752),
        (37.8024, -122.4485),
        (37.7952, -122.4029),
        (37.7879, -122.4075),
    ],
    [
        (37.7983, -122.3778),
        (37.7885, -122.3927),
        (37.7842, -122.4070),
        (37.7793, -122.4192),
        (37.7749, -122.4194),
    ],
    [
        (37.7544, -122.4477),
        (37.7600, -122.4350),
        (37.7645, -122.4250),
        (37.7650, -122.4150),
        (37.7600, -122.4100),
    ],
];

const MAX_SPEED: f64 = 120.0;
const MIN_BATTERY_TEMP: f64 = 20.0;
const WARNING_BATTERY_TEMP: f64 = 50.0;
const CRITICAL_BATTERY_TEMP: f64 = 58.0;
const MAX_BATTERY_TEMP: f64 = 65.0;
const MIN_TIRE_PRESSURE: f64 = 28.0;
const MAX_TIRE_PRESSURE: f64 = 38.0;
const LEG_STEP: f64 = 0.005;
const ANOMALY_CHANCE: f64 = 0.01;

#[derive(Debug)]
struct SimVehicle {
    id: usize,
    vin: String,
    route: usize,
    leg: usize,
    progress: f64,
    anomaly_ticks: u32,
    overheating: bool,
}

impl SimVehicle {
    fn new(id: usize, rng: &mut StdRng) -> Self {
        let route = rng.random_range(0..ROUTES.len());
        Self {
            id,
            vin: format!("RVN{id:09}"),
            route,
            leg: rng.random_range(0..ROUTES[route].len() - 1),
            progress: rng.random::<f64>(),
            anomaly_ticks: 0,
            overheating: false,
        }
    }

    fn position(&self) -> (f64, f64) {
        let route = &ROUTES[self.route];
        let (lat0, lon0) = route[self.leg];
        let (lat1, lon1) = route[self.leg + 1];
        (
            lat0 + (lat1 - lat0) * self.progress,
            lon0 + (lon1 - lon0) * self.progress,
        )
    }

    fn advance(&mut self) {
        self.progress += LEG_STEP;
        if self.progress >= 1.0 {
            self.progress = 0.0;
            self.leg += 1;
            if self.leg >= ROUTES[self.route].len() - 1 {
                self.leg = 0;
            }
        }
    }

    fn battery_temp(&mut self, rng: &mut StdRng) -> f64 {
        if self.anomaly_ticks == 0 && rng.random_bool(ANOMALY_CHANCE) {
            self.anomaly_ticks = rng.random_range(50..100);
        }
        if self.anomaly_ticks > 0 {
            self.anomaly_ticks -= 1;
            return CRITICAL_BATTERY_TEMP + rng.random::<f64>() * 10.0;
        }
        if self.id % 10 == 0 {
            rng.random_range(CRITICAL_BATTERY_TEMP..MAX_BATTERY_TEMP)
        } else {
            rng.random_range(MIN_BATTERY_TEMP..WARNING_BATTERY_TEMP)
        }
    }
}

struct Fleet {
    rng: StdRng,
    vehicles: Vec<SimVehicle>,
    ticker: Interval,
    pending: VecDeque<BrokerMessage>,
    telemetry_topic: String,
    alert_topic: String,
}

impl Fleet {
    fn step(&mut self) {
        let now = chrono::Utc::now().timestamp_millis();

        for vehicle in &mut self.vehicles {
            let (lat, lon) = vehicle.position();
            vehicle.advance();
            let speed = self.rng.random::<f64>() * MAX_SPEED;
            let temp = vehicle.battery_temp(&mut self.rng);
            let pressure = self.rng.random_range(MIN_TIRE_PRESSURE..MAX_TIRE_PRESSURE);

            let b = batch(
                vehicle.vin.clone(),
                now,
                [
                    (sensors::SPEED, speed),
                    (sensors::BATTERY_TEMP, temp),
                    (sensors::TIRE_PRESSURE, pressure),
                    (sensors::LATITUDE, lat),
                    (sensors::LONGITUDE, lon),
                ],
            );
            self.pending
                .push_back(BrokerMessage::new(&self.telemetry_topic, encode_batch(&b)));

            let overheating = temp > CRITICAL_BATTERY_TEMP;
            if overheating != vehicle.overheating {
                vehicle.overheating = overheating;
                let (kind, message) = if overheating {
                    (AlertKind::Critical, "Battery Overheat Detected")
                } else {
                    (AlertKind::Resolved, "Battery Temperature Normal")
                };
                let alert = AlertRecord {
                    vehicle_id: vehicle.vin.clone(),
                    kind,
                    message: message.to_string(),
                    value: temp,
                    timestamp: now,
                };
                if let Ok(json) = serde_json::to_vec(&alert) {
                    self.pending
                        .push_back(BrokerMessage::new(&self.alert_topic, json));
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    connected: bool,
    topics: Vec<String>,
}

/// Synthetic fleet driving fixed routes, encoded exactly like the broker feed.
#[derive(Debug)]
pub struct DemoSource {
    vehicles: usize,
    tick: Duration,
    seed: Option<u64>,
    session: Mutex<Session>,
}

impl DemoSource {
    pub fn new(vehicles: usize, tick: Duration) -> Self {
        Self {
            vehicles,
            tick,
            seed: None,
            session: Mutex::new(Session::default()),
        }
    }

    /// Fixes the random seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(500))
    }
}

#[async_trait]
impl TelemetrySource for DemoSource {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        self.lock().connected = true;
        info!(vehicles = self.vehicles, "demo fleet started");
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), SourceError> {
        let mut session = self.lock();
        if !session.connected {
            return Err(SourceError::NotConnected);
        }
        if topics.len() < 2 {
            return Err(SourceError::Subscribe(
                "demo source needs a telemetry and an alert topic".to_string(),
            ));
        }
        session.topics = topics.to_vec();
        Ok(())
    }

    async fn consume(&self) -> Result<MessageStream, SourceError> {
        let (telemetry_topic, alert_topic) = {
            let session = self.lock();
            match (session.connected, session.topics.as_slice()) {
                (true, [telemetry, alert, ..]) => (telemetry.clone(), alert.clone()),
                _ => return Err(SourceError::NotConnected),
            }
        };

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let vehicles = (1..=self.vehicles)
            .map(|id| SimVehicle::new(id, &mut rng))
            .collect();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let fleet = Fleet {
            rng,
            vehicles,
            ticker,
            pending: VecDeque::new(),
            telemetry_topic,
            alert_topic,
        };

        let messages = stream::unfold(fleet, |mut fleet| async move {
            loop {
                if let Some(msg) = fleet.pending.pop_front() {
                    return Some((Ok(msg), fleet));
                }
                fleet.ticker.tick().await;
                fleet.step();
            }
        });

        Ok(messages.boxed())
    }

    async fn disconnect(&self) {
        let mut session = self.lock();
        session.connected = false;
        session.topics.clear();
        info!("demo fleet stopped");
    }
}
