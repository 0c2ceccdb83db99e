//! The fan-out core.
//!
//! [`BrokerConsumerPool`] owns the one upstream consumer and the recency
//! cache; [`ClientRegistry`] tracks streaming clients and broadcasts to them;
//! [`ReconnectPolicy`] and [`IdleShutdown`] drive the upstream lifecycle.

pub mod idle;
pub mod message;
pub mod pool;
pub mod reconnect;
pub mod registry;
pub mod topic;

pub use idle::IdleShutdown;
pub use message::{BrokerMessage, StreamEvent};
pub use pool::{BrokerConsumerPool, ConnectionState, FleetSummary, PoolConfig};
pub use reconnect::ReconnectPolicy;
pub use registry::{BroadcastReport, ClientRegistry};
pub use topic::{TopicKind, Topics};
