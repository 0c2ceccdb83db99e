//! Turns raw upstream payloads into typed records.
//!
//! The decoder is stateless apart from knowing which topic carries which kind
//! of payload. Its result is a closed set of outcomes ([`Decoded`]) so the
//! consume loop switches on variants instead of catching failures.

use prost::Message;

use super::batch::{DataPoint, TelemetryBatch};
use super::record::{AlertPayload, AlertRecord, TelemetryRecord};
use crate::broker::topic::{TopicKind, Topics};
use crate::utils::error::DecodeError;

const LATITUDE: &str = "Latitude";
const LONGITUDE: &str = "Longitude";
const SPEED: &str = "Speed";
const TEMPERATURE: &str = "Temperature";
const AVERAGE: &str = "Average";

/// Outcome of decoding one upstream message.
#[derive(Debug)]
pub enum Decoded {
    /// A complete telemetry fix, ready to cache and broadcast.
    Record(TelemetryRecord),
    /// A valid batch without latitude or longitude. Dropped by the caller.
    Incomplete { vin: String },
    /// Alert payload forwarded unmodified.
    Passthrough(AlertPayload),
    /// Message on a topic this service does not route.
    Unrouted { topic: String },
    Error(DecodeError),
}

/// Field a sensor point feeds, picked by substring of its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Lat,
    Lon,
    Speed,
    Temp,
}

fn classify(sensor_id: &str) -> Option<Field> {
    if sensor_id.contains(LATITUDE) {
        Some(Field::Lat)
    } else if sensor_id.contains(LONGITUDE) {
        Some(Field::Lon)
    } else if sensor_id.contains(SPEED) {
        Some(Field::Speed)
    } else if sensor_id.contains(TEMPERATURE) && sensor_id.contains(AVERAGE) {
        Some(Field::Temp)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    topics: Topics,
}

impl TelemetryDecoder {
    pub fn new(topics: Topics) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Decode a message received on `topic`.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Decoded {
        match self.topics.kind(topic) {
            Some(TopicKind::Telemetry) => match decode_batch(payload) {
                Ok(batch) => match extract_record(&batch) {
                    Some(record) => Decoded::Record(record),
                    None => Decoded::Incomplete {
                        vin: batch.vehicle_id,
                    },
                },
                Err(e) => Decoded::Error(e),
            },
            Some(TopicKind::Alert) => match decode_alert(payload) {
                Ok(alert) => Decoded::Passthrough(alert),
                Err(e) => Decoded::Error(e),
            },
            None => Decoded::Unrouted {
                topic: topic.to_string(),
            },
        }
    }
}

/// Parse and validate a protobuf telemetry batch.
pub fn decode_batch(payload: &[u8]) -> Result<TelemetryBatch, DecodeError> {
    let batch = TelemetryBatch::decode(payload)?;
    if batch.vehicle_id.is_empty() {
        return Err(DecodeError::MissingVehicleId);
    }
    Ok(batch)
}

/// Encode a batch the way the ingest side does.
pub fn encode_batch(batch: &TelemetryBatch) -> Vec<u8> {
    batch.encode_to_vec()
}

/// Convenience constructor used by the demo source and tests.
pub fn batch(
    vehicle_id: impl Into<String>,
    timestamp: i64,
    points: impl IntoIterator<Item = (&'static str, f64)>,
) -> TelemetryBatch {
    TelemetryBatch {
        vehicle_id: vehicle_id.into(),
        timestamp,
        points: points
            .into_iter()
            .map(|(id, value)| DataPoint::new(id, value))
            .collect(),
    }
}

/// Map a batch's points onto a record.
///
/// Unmatched points are ignored; a missing speed or temperature reads as 0.
/// Returns `None` without both coordinates since that is not a position.
pub fn extract_record(batch: &TelemetryBatch) -> Option<TelemetryRecord> {
    let mut lat = None;
    let mut lon = None;
    let mut speed = 0.0;
    let mut temp = 0.0;

    for point in &batch.points {
        match classify(&point.sensor_id) {
            Some(Field::Lat) => lat = Some(point.value),
            Some(Field::Lon) => lon = Some(point.value),
            Some(Field::Speed) => speed = point.value,
            Some(Field::Temp) => temp = point.value,
            None => {}
        }
    }

    Some(TelemetryRecord {
        vin: batch.vehicle_id.clone(),
        lat: lat?,
        lon: lon?,
        speed,
        temp,
        timestamp: batch.timestamp,
    })
}

fn decode_alert(payload: &[u8]) -> Result<AlertPayload, DecodeError> {
    let text = std::str::from_utf8(payload)?;

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidAlert(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::InvalidAlert(format!(
            "expected an object, got {}",
            json_kind(&value)
        )));
    }

    let record = serde_json::from_value::<AlertRecord>(value).ok();

    Ok(AlertPayload {
        raw: text.into(),
        record,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
