//! Bounded in-memory recency state: the latest record per vehicle and a
//! newest-first ring of recent alerts.

pub mod recency;

pub use recency::{CacheSnapshot, RecencyCache};
