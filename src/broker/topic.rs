use std::collections::HashSet;

use crate::config::BrokerSettings;

/// What a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Telemetry,
    Alert,
}

/// The fixed pair of upstream topics the pool subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub telemetry: String,
    pub alert: String,
}

impl Topics {
    pub fn new(telemetry: impl Into<String>, alert: impl Into<String>) -> Self {
        Self {
            telemetry: telemetry.into(),
            alert: alert.into(),
        }
    }

    /// Both topic names, telemetry first.
    pub fn all(&self) -> Vec<String> {
        vec![self.telemetry.clone(), self.alert.clone()]
    }

    pub fn kind(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.telemetry {
            Some(TopicKind::Telemetry)
        } else if topic == self.alert {
            Some(TopicKind::Alert)
        } else {
            None
        }
    }

    /// Parses a comma separated interest list such as `telemetry-raw,telemetry-alerts`.
    ///
    /// Unknown names are dropped. An empty or absent list means every topic.
    pub fn parse_interest(&self, raw: Option<&str>) -> HashSet<String> {
        let requested: HashSet<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| self.kind(t).is_some())
            .map(str::to_string)
            .collect();

        if requested.is_empty() {
            self.all().into_iter().collect()
        } else {
            requested
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("telemetry-raw", "telemetry-alerts")
    }
}

impl From<&BrokerSettings> for Topics {
    fn from(settings: &BrokerSettings) -> Self {
        Self::new(&settings.telemetry_topic, &settings.alert_topic)
    }
}
