use serde::{Deserialize, Serialize};

/// Control messages a WebSocket client may send at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
}

/// Query string accepted by both stream endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamQuery {
    /// Comma separated topic names; all topics when absent.
    pub topics: Option<String>,
}

impl StreamQuery {
    /// Parses a raw query such as `topics=telemetry-raw%2Ctelemetry-alerts&x=1`.
    /// Unknown keys are ignored.
    pub fn parse(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(query)
    }
}
