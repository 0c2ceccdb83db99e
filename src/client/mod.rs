//! The `client` module defines the representation of one streaming client.
//!
//! A [`StreamClient`] holds its own state (interest set, sink handle and join
//! time) and lives in the broker's client registry for as long as its
//! connection does.

pub mod stream_client;
pub use stream_client::{ClientId, StreamClient};

#[cfg(test)]
mod tests;
