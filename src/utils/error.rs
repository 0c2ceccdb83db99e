//! Error types shared across the service.
//!
//! Each enum maps to one failure domain with its own recovery rule:
//! a `DecodeError` skips one message, a `DeliveryError` evicts one client,
//! a `SourceError` sends the upstream into backoff and a `PoolError` is the
//! terminal state reached once reconnect attempts are exhausted.

use thiserror::Error;

/// A single upstream message could not be decoded. Never fatal.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed telemetry batch: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("telemetry batch is missing vehicle_id")]
    MissingVehicleId,

    #[error("alert payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("alert payload is not a JSON object: {0}")]
    InvalidAlert(String),
}

/// A client's sink rejected an event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client sink is closed")]
    Closed,

    #[error("client sink is full")]
    Full,
}

/// Failures reported by a telemetry source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to connect to upstream: {0}")]
    Connect(String),

    #[error("failed to subscribe to upstream topics: {0}")]
    Subscribe(String),

    /// Transient error on a single receive; the consume loop keeps going.
    #[error("upstream consume error: {0}")]
    Consume(String),

    /// The upstream connection is gone; the consume loop must reconnect.
    #[error("upstream connection lost: {0}")]
    ConnectionLost(String),

    #[error("source is not connected")]
    NotConnected,
}

/// Consumer pool failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Max reconnection attempts reached")]
    ReconnectExhausted { attempts: u32 },

    #[error("stream service is shutting down")]
    ShutDown,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Startup and serving failures surfaced to `main`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("telemetry source '{0}' is not available in this build")]
    UnsupportedSource(String),
}
