use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{MessageStream, TelemetrySource};
use crate::broker::message::BrokerMessage;
use crate::utils::error::SourceError;

type Item = Result<BrokerMessage, SourceError>;

#[derive(Debug, Default)]
struct State {
    connected: bool,
    fail_next: u32,
    fail_all: bool,
    subscriptions: HashSet<String>,
    tx: Option<mpsc::UnboundedSender<Item>>,
    rx: Option<mpsc::UnboundedReceiver<Item>>,
}

/// In-memory source fed by [`publish`](Self::publish).
///
/// Each successful `connect` opens a fresh channel, so messages published
/// while disconnected are dropped like a `latest`-offset consumer would.
/// Connect failures and connection loss can be scripted.
#[derive(Debug, Default)]
pub struct ChannelSource {
    state: Mutex<State>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Every connect attempt fails until switched off.
    pub fn fail_all_connects(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    /// Queues a message if the source is connected and subscribed to `topic`.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        let state = self.lock();
        if !state.subscriptions.contains(topic) {
            return false;
        }
        match &state.tx {
            Some(tx) => tx.send(Ok(BrokerMessage::new(topic, payload))).is_ok(),
            None => false,
        }
    }

    /// Injects a transient consume error.
    pub fn inject_error(&self, reason: &str) -> bool {
        match &self.lock().tx {
            Some(tx) => tx.send(Err(SourceError::Consume(reason.to_string()))).is_ok(),
            None => false,
        }
    }

    /// Simulates the broker going away under a live consumer.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(Err(SourceError::ConnectionLost(
                "connection reset".to_string(),
            )));
        }
        state.connected = false;
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn subscriptions(&self) -> HashSet<String> {
        self.lock().subscriptions.clone()
    }
}

#[async_trait]
impl TelemetrySource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.fail_all {
            return Err(SourceError::Connect("upstream unavailable".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SourceError::Connect("upstream unavailable".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.tx = Some(tx);
        state.rx = Some(rx);
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), SourceError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(SourceError::NotConnected);
        }
        state.subscriptions = topics.iter().cloned().collect();
        debug!(topics = ?topics, "channel source subscribed");
        Ok(())
    }

    async fn consume(&self) -> Result<MessageStream, SourceError> {
        let rx = self.lock().rx.take().ok_or(SourceError::NotConnected)?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.connected = false;
        state.subscriptions.clear();
        state.tx = None;
        state.rx = None;
    }
}
