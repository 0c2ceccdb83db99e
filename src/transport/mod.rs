//! The `transport` module pushes fan-out events to streaming clients.
//!
//! Two flavours share the same consumer pool: server-sent events over HTTP
//! (with the summary and health routes alongside) and a WebSocket variant
//! whose clients can change their topic interest on the fly.

mod guard;
pub mod message;
pub mod sse;
pub mod websocket;

pub use sse::{AppState, build_router, start_http_server};
pub use websocket::{WsOptions, start_websocket_server};
