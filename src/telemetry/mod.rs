//! Telemetry payloads: the binary batch wire format, the decoded records and
//! the decoder that turns one into the other.

pub mod batch;
pub mod decoder;
pub mod record;

pub use batch::{DataPoint, TelemetryBatch, sensors};
pub use decoder::{Decoded, TelemetryDecoder, decode_batch, encode_batch, extract_record};
pub use record::{AlertKind, AlertPayload, AlertRecord, TelemetryRecord};

#[cfg(test)]
mod tests;
