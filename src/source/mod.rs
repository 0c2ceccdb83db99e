//! Upstream telemetry sources.
//!
//! The consumer pool only knows the [`TelemetrySource`] contract: connect,
//! subscribe to the fixed topic pair, then read `(topic, bytes)` messages
//! until the connection fails. Kafka, the synthetic demo fleet and the
//! in-memory channel source all plug in behind it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::broker::message::BrokerMessage;
use crate::config::{BrokerSettings, SourceKind};
use crate::utils::error::{ServerError, SourceError};

pub mod channel;
pub mod demo;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::ChannelSource;
pub use demo::DemoSource;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaSource, KafkaSourceConfig};

/// Messages read from a connected source. Ends when the connection does.
pub type MessageStream = BoxStream<'static, Result<BrokerMessage, SourceError>>;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<(), SourceError>;

    async fn subscribe(&self, topics: &[String]) -> Result<(), SourceError>;

    /// Starts reading. Only valid after a successful `connect` + `subscribe`.
    ///
    /// Per-message failures surface as `SourceError::Consume` items; the
    /// stream ending, or yielding `SourceError::ConnectionLost`, means the
    /// upstream is gone.
    async fn consume(&self) -> Result<MessageStream, SourceError>;

    /// Releases the upstream connection. Safe to call when not connected.
    async fn disconnect(&self);
}

/// Builds the source selected by `broker.source`.
pub fn from_settings(broker: &BrokerSettings) -> Result<Arc<dyn TelemetrySource>, ServerError> {
    match broker.source {
        SourceKind::Demo => Ok(Arc::new(DemoSource::default())),
        #[cfg(feature = "kafka")]
        SourceKind::Kafka => Ok(Arc::new(KafkaSource::new(KafkaSourceConfig::from(broker)))),
        #[cfg(not(feature = "kafka"))]
        SourceKind::Kafka => Err(ServerError::UnsupportedSource(
            SourceKind::Kafka.as_str().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn demo_source_from_default_settings() {
        let source = from_settings(&Settings::default().broker).unwrap();
        assert_eq!(source.name(), "demo");
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn kafka_needs_the_feature() {
        let mut broker = Settings::default().broker;
        broker.source = SourceKind::Kafka;
        assert!(matches!(
            from_settings(&broker),
            Err(ServerError::UnsupportedSource(name)) if name == "kafka"
        ));
    }

    #[tokio::test]
    async fn channel_source_requires_connect() {
        let source = ChannelSource::new();
        assert_eq!(
            source.subscribe(&["t".to_string()]).await,
            Err(SourceError::NotConnected)
        );
        assert!(!source.publish("t", b"x".to_vec()));

        source.connect().await.unwrap();
        source.subscribe(&["t".to_string()]).await.unwrap();
        let mut stream = source.consume().await.unwrap();
        assert!(source.publish("t", b"x".to_vec()));
        assert!(!source.publish("other", b"y".to_vec()));

        use futures::StreamExt;
        let msg = stream.next().await.unwrap().unwrap();
        assert_eq!(msg, BrokerMessage::new("t", b"x".to_vec()));

        source.drop_connection();
        assert_eq!(
            stream.next().await.unwrap(),
            Err(SourceError::ConnectionLost("connection reset".to_string()))
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn channel_source_scripted_failures() {
        let source = ChannelSource::new();
        source.fail_next_connects(2);
        assert!(source.connect().await.is_err());
        assert!(source.connect().await.is_err());
        assert!(source.connect().await.is_ok());
        assert_eq!(source.connect_calls(), 3);
    }
}
