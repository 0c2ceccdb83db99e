use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the service.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub stream: StreamSettings,
    pub reconnect: ReconnectSettings,
    pub logging: LoggingSettings,
}

/// Where the push endpoints listen.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    /// HTTP port serving the SSE stream, summary and health routes.
    pub port: u16,
    /// Port of the WebSocket variant of the stream.
    pub ws_port: u16,
}

/// Which upstream to consume and which topics to read.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub source: SourceKind,
    pub bootstrap_servers: String,
    pub group_id: String,
    pub telemetry_topic: String,
    pub alert_topic: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic generator, no broker required.
    Demo,
    /// Kafka consumer; needs the `kafka` cargo feature.
    Kafka,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Demo => "demo",
            SourceKind::Kafka => "kafka",
        }
    }
}

/// Fan-out, cache and client lifecycle tuning.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamSettings {
    pub max_alerts: usize,
    pub max_vehicle_age_ms: u64,
    pub sweep_interval_ms: u64,
    pub idle_shutdown_secs: u64,
    pub keepalive_secs: u64,
    /// Capacity of each client's outbound queue.
    pub client_buffer: usize,
}

impl StreamSettings {
    pub fn max_vehicle_age(&self) -> Duration {
        Duration::from_millis(self.max_vehicle_age_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn idle_shutdown(&self) -> Duration {
        Duration::from_secs(self.idle_shutdown_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

/// Upstream reconnect backoff.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub stream: Option<PartialStreamSettings>,
    pub reconnect: Option<PartialReconnectSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ws_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub source: Option<SourceKind>,
    pub bootstrap_servers: Option<String>,
    pub group_id: Option<String>,
    pub telemetry_topic: Option<String>,
    pub alert_topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStreamSettings {
    pub max_alerts: Option<usize>,
    pub max_vehicle_age_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub idle_shutdown_secs: Option<u64>,
    pub keepalive_secs: Option<u64>,
    pub client_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialReconnectSettings {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        Settings {
            server: self.server.unwrap_or_default().merge(defaults.server),
            broker: self.broker.unwrap_or_default().merge(defaults.broker),
            stream: self.stream.unwrap_or_default().merge(defaults.stream),
            reconnect: self.reconnect.unwrap_or_default().merge(defaults.reconnect),
            logging: LoggingSettings {
                level: self
                    .logging
                    .and_then(|l| l.level)
                    .unwrap_or(defaults.logging.level),
            },
        }
    }
}

impl PartialServerSettings {
    fn merge(self, d: ServerSettings) -> ServerSettings {
        ServerSettings {
            host: self.host.unwrap_or(d.host),
            port: self.port.unwrap_or(d.port),
            ws_port: self.ws_port.unwrap_or(d.ws_port),
        }
    }
}

impl PartialBrokerSettings {
    fn merge(self, d: BrokerSettings) -> BrokerSettings {
        BrokerSettings {
            source: self.source.unwrap_or(d.source),
            bootstrap_servers: self.bootstrap_servers.unwrap_or(d.bootstrap_servers),
            group_id: self.group_id.unwrap_or(d.group_id),
            telemetry_topic: self.telemetry_topic.unwrap_or(d.telemetry_topic),
            alert_topic: self.alert_topic.unwrap_or(d.alert_topic),
        }
    }
}

impl PartialStreamSettings {
    fn merge(self, d: StreamSettings) -> StreamSettings {
        StreamSettings {
            max_alerts: self.max_alerts.unwrap_or(d.max_alerts),
            max_vehicle_age_ms: self.max_vehicle_age_ms.unwrap_or(d.max_vehicle_age_ms),
            sweep_interval_ms: self.sweep_interval_ms.unwrap_or(d.sweep_interval_ms),
            idle_shutdown_secs: self.idle_shutdown_secs.unwrap_or(d.idle_shutdown_secs),
            keepalive_secs: self.keepalive_secs.unwrap_or(d.keepalive_secs),
            client_buffer: self.client_buffer.unwrap_or(d.client_buffer),
        }
    }
}

impl PartialReconnectSettings {
    fn merge(self, d: ReconnectSettings) -> ReconnectSettings {
        ReconnectSettings {
            max_attempts: self.max_attempts.unwrap_or(d.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(d.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(d.max_delay_ms),
        }
    }
}

/// Defaults match a local development broker on port 19092.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                ws_port: 8081,
            },
            broker: BrokerSettings {
                source: SourceKind::Demo,
                bootstrap_servers: "localhost:19092".to_string(),
                group_id: "telecast-dashboard".to_string(),
                telemetry_topic: "telemetry-raw".to_string(),
                alert_topic: "telemetry-alerts".to_string(),
            },
            stream: StreamSettings {
                max_alerts: 50,
                max_vehicle_age_ms: 5_000,
                sweep_interval_ms: 2_000,
                idle_shutdown_secs: 30,
                keepalive_secs: 30,
                client_buffer: 256,
            },
            reconnect: ReconnectSettings {
                max_attempts: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
