use std::collections::HashSet;

use super::stream_client::{StreamClient, deliver_to};
use crate::broker::message::StreamEvent;
use crate::utils::error::DeliveryError;
use tokio::sync::mpsc;

fn topics(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn error_event() -> StreamEvent {
    StreamEvent::Error {
        error: "boom".to_string(),
    }
}

#[test]
fn test_client_new() {
    let (tx, _) = mpsc::channel(1);
    let client = StreamClient::new(tx, topics(&["telemetry-raw"]));
    assert!(client.id.starts_with("client-"));
    assert!(client.is_interested("telemetry-raw"));
    assert!(!client.is_interested("telemetry-alerts"));
}

#[test]
fn test_client_ids_are_unique() {
    let (tx, _) = mpsc::channel(1);
    let a = StreamClient::new(tx.clone(), HashSet::new());
    let b = StreamClient::new(tx, HashSet::new());
    assert_ne!(a.id, b.id);
}

#[test]
fn test_deliver_ok() {
    let (tx, mut rx) = mpsc::channel(1);
    let client = StreamClient::with_id("c1", tx, HashSet::new());
    deliver_to(&client.sink, error_event()).unwrap();
    assert_eq!(rx.try_recv().unwrap(), error_event());
}

#[test]
fn test_deliver_full() {
    let (tx, _rx) = mpsc::channel(1);
    let client = StreamClient::with_id("c1", tx, HashSet::new());
    deliver_to(&client.sink, error_event()).unwrap();
    assert_eq!(deliver_to(&client.sink, error_event()), Err(DeliveryError::Full));
}

#[test]
fn test_deliver_closed() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let client = StreamClient::with_id("c1", tx, HashSet::new());
    assert_eq!(deliver_to(&client.sink, error_event()), Err(DeliveryError::Closed));
}
