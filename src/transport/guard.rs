use std::sync::Arc;

use crate::broker::BrokerConsumerPool;
use crate::client::ClientId;

/// Removes its client from the pool when the connection that owns it goes
/// away, however that happens.
pub struct ClientGuard {
    pool: Arc<BrokerConsumerPool>,
    client_id: ClientId,
}

impl ClientGuard {
    pub fn new(pool: Arc<BrokerConsumerPool>, client_id: ClientId) -> Self {
        Self { pool, client_id }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.pool.remove(&self.client_id);
    }
}
