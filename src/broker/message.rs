use std::sync::Arc;

use serde_json::{Value, json};
use tungstenite::protocol::Message as WsMessage;

use crate::telemetry::TelemetryRecord;

/// One raw message read from the upstream broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// An event pushed to streaming clients.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// First event on every stream.
    Connected { client_id: String, clients: usize },
    Telemetry(TelemetryRecord),
    /// Alert JSON exactly as received upstream.
    Alert(Arc<str>),
    Error { error: String },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Telemetry(_) => "telemetry",
            StreamEvent::Alert(_) => "alert",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// The event payload as JSON text.
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Connected { client_id, clients } => {
                json!({ "clientId": client_id, "clients": clients }).to_string()
            }
            StreamEvent::Telemetry(record) => json!({
                "vin": record.vin,
                "lat": record.lat,
                "lon": record.lon,
                "speed": record.speed,
                "temp": record.temp,
            })
            .to_string(),
            StreamEvent::Alert(raw) => raw.to_string(),
            StreamEvent::Error { error } => json!({ "error": error }).to_string(),
        }
    }

    /// Renders the event as a WebSocket text frame `{"event": .., "data": ..}`.
    pub fn to_ws_frame(&self) -> WsMessage {
        let data = match self {
            // Forward the alert text as-is rather than re-serializing it.
            StreamEvent::Alert(raw) => {
                return WsMessage::text(format!(r#"{{"event":"alert","data":{raw}}}"#));
            }
            other => serde_json::from_str::<Value>(&other.data()).unwrap_or(Value::Null),
        };
        WsMessage::text(json!({ "event": self.name(), "data": data }).to_string())
    }
}
