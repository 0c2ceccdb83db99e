use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Decoded per-vehicle scalar snapshot.
///
/// Serialized as `{vin, lat, lon, speed, temp}`; the producer timestamp stays
/// server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub vin: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub temp: f64,
    #[serde(skip)]
    pub timestamp: i64,
}

/// Severity carried in an alert's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "RESOLVED")]
    Resolved,
    /// Domain-specific types such as `BATTERY_OVERHEAT`.
    #[serde(untagged)]
    Other(String),
}

/// An alert event as produced upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub vehicle_id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub value: f64,
    pub timestamp: i64,
}

/// An alert as it travels through the service: the raw JSON text, forwarded
/// byte for byte, plus its typed form when the payload matches `AlertRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    pub raw: Arc<str>,
    pub record: Option<AlertRecord>,
}

impl AlertPayload {
    pub fn is_critical(&self) -> bool {
        matches!(
            self.record.as_ref().map(|r| &r.kind),
            Some(AlertKind::Critical)
        )
    }
}
