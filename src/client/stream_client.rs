use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::broker::message::StreamEvent;
use crate::utils::error::DeliveryError;

pub type ClientId = String;

/// One active downstream push connection.
///
/// The registry owns these; transports keep only the receiving half of
/// `sink` and the id.
#[derive(Debug, Clone)]
pub struct StreamClient {
    /// Unique identifier, `client-<uuid>`.
    pub id: ClientId,

    /// Bounded queue drained by the connection's writer task.
    pub sink: mpsc::Sender<StreamEvent>,

    /// Topic names this client wants events for.
    pub topics: HashSet<String>,

    pub joined_at: DateTime<Utc>,
}

impl StreamClient {
    pub fn new(sink: mpsc::Sender<StreamEvent>, topics: HashSet<String>) -> Self {
        Self::with_id(format!("client-{}", uuid::Uuid::new_v4()), sink, topics)
    }

    pub fn with_id(
        id: impl Into<ClientId>,
        sink: mpsc::Sender<StreamEvent>,
        topics: HashSet<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sink,
            topics,
            joined_at: Utc::now(),
        }
    }

    pub fn is_interested(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }
}

/// Single non-blocking delivery attempt.
pub(crate) fn deliver_to(
    sink: &mpsc::Sender<StreamEvent>,
    event: StreamEvent,
) -> Result<(), DeliveryError> {
    sink.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Full,
        TrySendError::Closed(_) => DeliveryError::Closed,
    })
}
