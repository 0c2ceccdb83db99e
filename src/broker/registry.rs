use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::message::StreamEvent;
use crate::client::stream_client::deliver_to;
use crate::client::{ClientId, StreamClient};
use crate::utils::error::DeliveryError;

/// Result of one broadcast pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: Vec<ClientId>,
    /// Registry size once evictions were applied.
    pub remaining: usize,
}

/// Active streaming clients keyed by id.
///
/// Mutations are serialized by a mutex that is never held while delivering:
/// a broadcast copies the interested sinks out first, so a client joining
/// mid-pass waits for the next message and a client removed before the pass
/// began is never in the copy.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, StreamClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, StreamClient>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a client and sends it the `connected` acknowledgment.
    ///
    /// Returns the new client count. If the acknowledgment cannot be queued
    /// the client is dropped again and the error returned.
    pub fn register(&self, client: StreamClient) -> Result<usize, DeliveryError> {
        self.register_with(client, Vec::new())
    }

    /// Like [`register`](Self::register), then queues `replay` behind the
    /// ack. Replay takes at most half of the free queue so live events
    /// still fit; the rest of `replay` is dropped.
    pub fn register_with(
        &self,
        client: StreamClient,
        replay: Vec<StreamEvent>,
    ) -> Result<usize, DeliveryError> {
        let mut clients = self.lock();
        let id = client.id.clone();
        let sink = client.sink.clone();
        clients.insert(id.clone(), client);
        let count = clients.len();

        let ack = StreamEvent::Connected {
            client_id: id.clone(),
            clients: count,
        };
        if let Err(e) = deliver_to(&sink, ack) {
            clients.remove(&id);
            warn!(client_id = %id, error = %e, "dropping client, connected ack failed");
            return Err(e);
        }

        let budget = sink.capacity() / 2;
        if replay.len() > budget {
            debug!(client_id = %id, cached = replay.len(), budget, "truncating replay");
        }
        for event in replay.into_iter().take(budget) {
            if deliver_to(&sink, event).is_err() {
                break;
            }
        }

        debug!(client_id = %id, clients = count, "client registered");
        Ok(count)
    }

    /// Removes a client. Returns the remaining count if it was present.
    pub fn remove(&self, client_id: &str) -> Option<usize> {
        let mut clients = self.lock();
        clients.remove(client_id).map(|_| clients.len())
    }

    pub fn subscribe(&self, client_id: &str, topic: &str) -> bool {
        match self.lock().get_mut(client_id) {
            Some(client) => {
                client.topics.insert(topic.to_string());
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, client_id: &str, topic: &str) -> bool {
        match self.lock().get_mut(client_id) {
            Some(client) => {
                client.topics.remove(topic);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.lock().contains_key(client_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Delivers `event` to every client interested in `topic`.
    pub fn broadcast(&self, topic: &str, event: &StreamEvent) -> BroadcastReport {
        let targets = self.snapshot(|c| c.is_interested(topic));
        self.deliver_all(targets, event)
    }

    /// Delivers `event` to every client regardless of interest.
    pub fn notify_all(&self, event: &StreamEvent) -> BroadcastReport {
        let targets = self.snapshot(|_| true);
        self.deliver_all(targets, event)
    }

    fn snapshot(
        &self,
        filter: impl Fn(&StreamClient) -> bool,
    ) -> Vec<(ClientId, mpsc::Sender<StreamEvent>)> {
        self.lock()
            .values()
            .filter(|c| filter(c))
            .map(|c| (c.id.clone(), c.sink.clone()))
            .collect()
    }

    fn deliver_all(
        &self,
        targets: Vec<(ClientId, mpsc::Sender<StreamEvent>)>,
        event: &StreamEvent,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, sink) in targets {
            match deliver_to(&sink, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(client_id = %id, error = %e, "evicting client");
                    self.remove(&id);
                    report.evicted.push(id);
                }
            }
        }

        report.remaining = self.len();
        report
    }
}
