//! # Telecast
//!
//! `telecast` fans a live vehicle telemetry feed out to any number of
//! streaming dashboard clients while holding exactly one upstream broker
//! consumer.
//!
//! ## Core Modules
//!
//! - `telemetry`: the binary batch wire format and its decoder.
//! - `cache`: bounded recency state (latest fix per vehicle, recent alerts).
//! - `broker`: the consumer pool, client registry, reconnect policy and idle shutdown.
//! - `client`: one streaming client as the registry sees it.
//! - `source`: upstream implementations (Kafka, demo fleet, in-memory channel).
//! - `transport`: SSE and WebSocket endpoints.
//! - `config`: layered settings from file and environment.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod cache;
pub mod client;
pub mod config;
pub mod source;
pub mod telemetry;
pub mod transport;
pub mod utils;
