//! Kafka telemetry source.
//!
//! Reads the telemetry and alert topics with one `StreamConsumer`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as KafkaMessage;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, info, warn};

use super::{MessageStream, TelemetrySource};
use crate::broker::message::BrokerMessage;
use crate::config::BrokerSettings;
use crate::utils::error::SourceError;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the Kafka consumer.
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    /// Comma separated bootstrap servers.
    pub bootstrap_servers: String,
    pub group_id: String,
}

impl KafkaSourceConfig {
    fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        // Live view only: start at the head and never replay.
        config.set("auto.offset.reset", "latest");
        config.set("enable.auto.commit", "true");
        config.set("session.timeout.ms", "30000");
        config.set("heartbeat.interval.ms", "3000");
        config.set("fetch.wait.max.ms", "100");
        config
    }
}

impl From<&BrokerSettings> for KafkaSourceConfig {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            bootstrap_servers: settings.bootstrap_servers.clone(),
            group_id: settings.group_id.clone(),
        }
    }
}

pub struct KafkaSource {
    config: KafkaSourceConfig,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
}

impl KafkaSource {
    pub fn new(config: KafkaSourceConfig) -> Self {
        Self {
            config,
            consumer: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<StreamConsumer>>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Result<Arc<StreamConsumer>, SourceError> {
        self.slot().clone().ok_or(SourceError::NotConnected)
    }
}

fn is_fatal(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::AllBrokersDown) | Some(RDKafkaErrorCode::Fatal)
    )
}

#[async_trait]
impl TelemetrySource for KafkaSource {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn connect(&self) -> Result<(), SourceError> {
        let consumer: StreamConsumer = self
            .config
            .build_consumer_config()
            .create()
            .map_err(|e| SourceError::Connect(format!("failed to create consumer: {e}")))?;
        let consumer = Arc::new(consumer);

        // Creating a consumer does not touch the network; fetch metadata to
        // find out whether a broker actually answers.
        let probe = consumer.clone();
        tokio::task::spawn_blocking(move || probe.fetch_metadata(None, METADATA_TIMEOUT))
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        info!(bootstrap_servers = %self.config.bootstrap_servers, "connected to Kafka");
        *self.slot() = Some(consumer);
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), SourceError> {
        let consumer = self.current()?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| SourceError::Subscribe(e.to_string()))?;
        info!(topics = ?topics, group_id = %self.config.group_id, "subscribed to Kafka topics");
        Ok(())
    }

    async fn consume(&self) -> Result<MessageStream, SourceError> {
        let consumer = self.current()?;

        let messages = stream::unfold(consumer, |consumer| async move {
            let item = match consumer.recv().await {
                Ok(message) => {
                    debug!(
                        topic = %message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "received message"
                    );
                    Ok(BrokerMessage::new(
                        message.topic(),
                        message.payload().unwrap_or_default(),
                    ))
                }
                Err(e) if is_fatal(&e) => Err(SourceError::ConnectionLost(e.to_string())),
                Err(e) => {
                    warn!(error = %e, "Kafka consumer error");
                    Err(SourceError::Consume(e.to_string()))
                }
            };
            Some((item, consumer))
        });

        Ok(messages.boxed())
    }

    async fn disconnect(&self) {
        if let Some(consumer) = self.slot().take() {
            consumer.unsubscribe();
            info!("disconnected from Kafka");
        }
    }
}
