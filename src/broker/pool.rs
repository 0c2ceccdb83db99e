use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::idle::IdleShutdown;
use crate::broker::message::{BrokerMessage, StreamEvent};
use crate::broker::reconnect::ReconnectPolicy;
use crate::broker::registry::{BroadcastReport, ClientRegistry};
use crate::broker::topic::Topics;
use crate::cache::RecencyCache;
use crate::client::StreamClient;
use crate::config::Settings;
use crate::source::{MessageStream, TelemetrySource};
use crate::telemetry::{Decoded, TelemetryDecoder};
use crate::utils::error::{PoolError, SourceError};

/// Lifecycle of the single upstream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    BackingOff,
    Failed,
}

/// Pool tuning, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub topics: Topics,
    pub max_alerts: usize,
    pub max_vehicle_age: Duration,
    pub sweep_interval: Duration,
    pub idle_shutdown: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            topics: Topics::default(),
            max_alerts: 50,
            max_vehicle_age: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(2),
            idle_shutdown: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl From<&Settings> for PoolConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            topics: Topics::from(&settings.broker),
            max_alerts: settings.stream.max_alerts,
            max_vehicle_age: settings.stream.max_vehicle_age(),
            sweep_interval: settings.stream.sweep_interval(),
            idle_shutdown: settings.stream.idle_shutdown(),
            reconnect: ReconnectPolicy::from(&settings.reconnect),
        }
    }
}

/// Fallback summary computed from the recency cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub active_vehicles: usize,
    pub avg_speed: f64,
    pub critical_alerts: usize,
    pub clients: usize,
    pub upstream: ConnectionState,
    /// Newest first, as received.
    pub recent_alerts: Vec<serde_json::Value>,
}

/// A running connect/consume cycle.
struct Cycle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

enum Exit {
    Cancelled,
    Lost(String),
}

/// Owner of the single upstream consumer shared by every streaming client.
///
/// Construct one per process with [`BrokerConsumerPool::new`] and hand the
/// `Arc` to request handlers. The upstream connection is opened by the first
/// registration and released once the registry has stayed empty for the
/// idle window. Only the consume task and the sweeper touch the cache.
pub struct BrokerConsumerPool {
    me: Weak<Self>,
    source: Arc<dyn TelemetrySource>,
    topics: Topics,
    decoder: TelemetryDecoder,
    registry: ClientRegistry,
    cache: Mutex<RecencyCache>,
    policy: Mutex<ReconnectPolicy>,
    state: watch::Sender<ConnectionState>,
    idle: IdleShutdown,
    cycle: Mutex<Option<Cycle>>,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BrokerConsumerPool {
    pub fn new(source: Arc<dyn TelemetrySource>, config: PoolConfig) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            decoder: TelemetryDecoder::new(config.topics.clone()),
            topics: config.topics,
            registry: ClientRegistry::new(),
            cache: Mutex::new(RecencyCache::new(
                config.max_alerts,
                config.max_vehicle_age,
            )),
            policy: Mutex::new(config.reconnect),
            state,
            idle: IdleShutdown::new(config.idle_shutdown),
            cycle: Mutex::new(None),
            sweep_interval: config.sweep_interval,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn has_client(&self, client_id: &str) -> bool {
        self.registry.contains(client_id)
    }

    pub fn is_idle_armed(&self) -> bool {
        self.idle.is_armed()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "upstream state changed");
        }
    }

    /// Registers a streaming client and makes sure the upstream is live.
    ///
    /// The client gets its `connected` ack followed by the latest record of
    /// cached vehicles when it wants telemetry. Refused once the pool has
    /// been shut down.
    pub fn register(&self, client: StreamClient) -> Result<usize, PoolError> {
        if self.shutdown.is_cancelled() {
            debug!(client_id = %client.id, "refusing client, pool is shut down");
            return Err(PoolError::ShutDown);
        }
        self.idle.cancel();

        let replay: Vec<StreamEvent> = if client.is_interested(&self.topics.telemetry) {
            lock(&self.cache)
                .vehicles()
                .cloned()
                .map(StreamEvent::Telemetry)
                .collect()
        } else {
            Vec::new()
        };

        let id = client.id.clone();
        match self.registry.register_with(client, replay) {
            Ok(_) if self.shutdown.is_cancelled() => {
                self.registry.remove(&id);
                Err(PoolError::ShutDown)
            }
            Ok(count) => {
                info!(client_id = %id, clients = count, "client connected");
                self.ensure_connected();
                Ok(count)
            }
            Err(e) => {
                if self.registry.is_empty() {
                    self.arm_idle();
                }
                Err(e.into())
            }
        }
    }

    /// Removes a client; idempotent. Arms the idle timer when it was the last.
    pub fn remove(&self, client_id: &str) -> Option<usize> {
        let remaining = self.registry.remove(client_id);
        if let Some(remaining) = remaining {
            info!(client_id = %client_id, clients = remaining, "client disconnected");
            if remaining == 0 {
                self.arm_idle();
            }
        }
        remaining
    }

    pub fn subscribe(&self, client_id: &str, topic: &str) -> bool {
        self.topics.kind(topic).is_some() && self.registry.subscribe(client_id, topic)
    }

    pub fn unsubscribe(&self, client_id: &str, topic: &str) -> bool {
        self.registry.unsubscribe(client_id, topic)
    }

    fn arm_idle(&self) {
        let pool = self.me.clone();
        self.idle.arm(move || {
            let Some(pool) = pool.upgrade() else {
                return;
            };
            if pool.registry.is_empty() {
                info!("no clients left, releasing upstream consumer");
                tokio::spawn(async move { pool.disconnect().await });
            }
        });
    }

    /// Starts a connect cycle unless one is already running.
    ///
    /// A pool in `Failed` restarts from attempt zero.
    pub fn ensure_connected(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut cycle = lock(&self.cycle);
        if !matches!(
            self.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            return;
        }
        let Some(pool) = self.me.upgrade() else {
            return;
        };

        if let Some(previous) = cycle.take() {
            previous.token.cancel();
        }
        lock(&self.policy).reset();
        self.set_state(ConnectionState::Connecting);

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(pool.run_connection(token.clone()));
        *cycle = Some(Cycle { token, handle });
    }

    /// Stops the connect cycle and releases the upstream.
    ///
    /// Clients that registered while the cycle was being torn down start a
    /// fresh one.
    pub async fn disconnect(&self) {
        let cycle = lock(&self.cycle).take();
        if let Some(cycle) = cycle {
            cycle.token.cancel();
            if let Err(e) = cycle.handle.await {
                error!(error = %e, "consumer task failed");
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!(source = self.source.name(), "upstream consumer disconnected");

        if !self.registry.is_empty() {
            self.ensure_connected();
        }
    }

    /// Stops every task, drops all clients and disconnects.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.idle.cancel();
        self.registry.clear();
        self.disconnect().await;
    }

    async fn open(&self) -> Result<MessageStream, SourceError> {
        self.source.connect().await?;
        let subscribed = self.source.subscribe(&self.topics.all()).await;
        let stream = match subscribed {
            Ok(()) => self.source.consume().await,
            Err(e) => Err(e),
        };
        if stream.is_err() {
            self.source.disconnect().await;
        }
        stream
    }

    async fn run_connection(self: Arc<Self>, token: CancellationToken) {
        loop {
            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                opened = self.open() => Some(opened),
            };
            let Some(opened) = opened else {
                self.source.disconnect().await;
                return;
            };

            match opened {
                Ok(stream) => {
                    lock(&self.policy).reset();
                    self.set_state(ConnectionState::Connected);
                    info!(
                        source = self.source.name(),
                        topics = ?self.topics.all(),
                        "upstream consumer connected"
                    );

                    match self.consume(stream, &token).await {
                        Exit::Cancelled => {
                            self.source.disconnect().await;
                            return;
                        }
                        Exit::Lost(reason) => {
                            warn!(reason = %reason, "upstream connection lost");
                            self.source.disconnect().await;
                            if !self.retry_after_loss() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let delay = {
                        let mut policy = lock(&self.policy);
                        if policy.exhausted() {
                            None
                        } else {
                            Some((policy.next_delay(), policy.attempts()))
                        }
                    };

                    let Some((delay, attempt)) = delay else {
                        self.fail();
                        return;
                    };

                    self.set_state(ConnectionState::BackingOff);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "upstream connect failed, backing off"
                    );

                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.set_state(ConnectionState::Connecting);
                }
            }
        }
    }

    /// After an upstream loss: reconnect if anyone is listening.
    fn retry_after_loss(&self) -> bool {
        let _cycle = lock(&self.cycle);
        if self.registry.is_empty() {
            self.set_state(ConnectionState::Disconnected);
            false
        } else {
            self.set_state(ConnectionState::Connecting);
            true
        }
    }

    fn fail(&self) {
        let attempts = lock(&self.policy).attempts();
        let err = PoolError::ReconnectExhausted { attempts };
        {
            let _cycle = lock(&self.cycle);
            self.set_state(ConnectionState::Failed);
        }
        error!(attempts, "upstream unreachable, giving up until the next client");

        let report = self.registry.notify_all(&StreamEvent::Error {
            error: err.to_string(),
        });
        self.after_broadcast(&report);
    }

    async fn consume(&self, mut stream: MessageStream, token: &CancellationToken) -> Exit {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Exit::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        self.dispatch(&message);
                    }
                    Some(Err(SourceError::ConnectionLost(reason))) => return Exit::Lost(reason),
                    Some(Err(e)) => warn!(error = %e, "consume error, continuing"),
                    None => return Exit::Lost("message stream ended".to_string()),
                },
            }
        }
    }

    /// Decodes one upstream message, updates the cache and fans it out.
    pub(crate) fn dispatch(&self, message: &BrokerMessage) -> Option<BroadcastReport> {
        let report = match self.decoder.decode(&message.topic, &message.payload) {
            Decoded::Record(record) => {
                lock(&self.cache).upsert_vehicle(record.clone());
                self.registry
                    .broadcast(&message.topic, &StreamEvent::Telemetry(record))
            }
            Decoded::Passthrough(alert) => {
                let raw = alert.raw.clone();
                lock(&self.cache).push_alert(alert);
                self.registry.broadcast(&message.topic, &StreamEvent::Alert(raw))
            }
            Decoded::Incomplete { vin } => {
                debug!(vin = %vin, "dropping batch without a position fix");
                return None;
            }
            Decoded::Unrouted { topic } => {
                debug!(topic = %topic, "ignoring message on unrouted topic");
                return None;
            }
            Decoded::Error(e) => {
                warn!(topic = %message.topic, error = %e, "skipping undecodable message");
                return None;
            }
        };

        self.after_broadcast(&report);
        Some(report)
    }

    fn after_broadcast(&self, report: &BroadcastReport) {
        if !report.evicted.is_empty() {
            debug!(
                evicted = report.evicted.len(),
                remaining = report.remaining,
                "evicted unresponsive clients"
            );
            if report.remaining == 0 {
                self.arm_idle();
            }
        }
    }

    /// Evicts stale vehicles now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        lock(&self.cache).sweep()
    }

    /// Runs [`sweep`](Self::sweep) every sweep interval until shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let pool = self.me.clone();
        let token = self.shutdown.clone();
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        let removed = pool.sweep();
                        if removed > 0 {
                            debug!(removed, "swept stale vehicles");
                        }
                    }
                }
            }
        })
    }

    pub fn summary(&self) -> FleetSummary {
        let snapshot = lock(&self.cache).snapshot();
        FleetSummary {
            active_vehicles: snapshot.active_vehicles,
            avg_speed: snapshot.avg_speed,
            critical_alerts: snapshot.critical_alerts,
            clients: self.registry.len(),
            upstream: self.state(),
            recent_alerts: snapshot
                .recent_alerts
                .iter()
                .map(|a| {
                    serde_json::from_str(&a.raw)
                        .unwrap_or_else(|_| serde_json::Value::String(a.raw.to_string()))
                })
                .collect(),
        }
    }
}
