use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use telecast::broker::{BrokerConsumerPool, ConnectionState, PoolConfig, StreamEvent};
use telecast::client::StreamClient;
use telecast::source::ChannelSource;
use telecast::telemetry::{decoder, encode_batch};
use telecast::transport::AppState;
use telecast::transport::sse::serve_http;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const ALERT: &str = r#"{"vehicle_id":"RVN000000003","type":"CRITICAL","message":"Battery Overheat Detected","value":62.5,"timestamp":1700000000000}"#;

fn topics(names: &[&str]) -> HashSet<String> {
    names.iter().map(|t| t.to_string()).collect()
}

async fn wait_connected(pool: &BrokerConsumerPool) {
    let mut states = pool.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("upstream connected in time")
    .expect("state sender alive");
}

async fn recv(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("sink open")
}

#[tokio::test]
async fn fans_out_by_interest_over_one_upstream() {
    let source = Arc::new(ChannelSource::new());
    let pool = BrokerConsumerPool::new(source.clone(), PoolConfig::default());

    let (map_tx, mut map_rx) = mpsc::channel(16);
    let (ops_tx, mut ops_rx) = mpsc::channel(16);
    pool.register(StreamClient::new(map_tx, topics(&["telemetry-raw"])))
        .unwrap();
    pool.register(StreamClient::new(
        ops_tx,
        topics(&["telemetry-raw", "telemetry-alerts"]),
    ))
    .unwrap();

    assert!(matches!(recv(&mut map_rx).await, StreamEvent::Connected { clients: 1, .. }));
    assert!(matches!(recv(&mut ops_rx).await, StreamEvent::Connected { clients: 2, .. }));
    wait_connected(&pool).await;
    assert_eq!(source.connect_calls(), 1);

    let fix = encode_batch(&decoder::batch(
        "RVN000000003",
        1_700_000_000_000,
        [
            ("Latitude", 37.7749),
            ("Longitude", -122.4194),
            ("Speed", 42.0),
            ("Battery Temperature Average", 38.5),
        ],
    ));
    assert!(source.publish("telemetry-raw", fix));
    assert!(source.publish("telemetry-alerts", ALERT.as_bytes()));

    for rx in [&mut map_rx, &mut ops_rx] {
        match recv(rx).await {
            StreamEvent::Telemetry(record) => {
                assert_eq!(record.vin, "RVN000000003");
                assert_eq!(record.speed, 42.0);
                assert_eq!(record.temp, 38.5);
            }
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    match recv(&mut ops_rx).await {
        StreamEvent::Alert(raw) => assert_eq!(&*raw, ALERT),
        other => panic!("expected alert, got {other:?}"),
    }
    assert!(map_rx.try_recv().is_err());

    let summary = pool.summary();
    assert_eq!(summary.active_vehicles, 1);
    assert_eq!(summary.critical_alerts, 1);
    assert_eq!(summary.clients, 2);

    pool.shutdown().await;
    assert_eq!(pool.state(), ConnectionState::Disconnected);
    assert_eq!(source.connect_calls(), 1);
}

async fn read_until(stream: &mut TcpStream, buf: &mut String, needle: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut chunk = [0u8; 4096];
        while !buf.contains(needle) {
            let n = stream.read(&mut chunk).await.expect("read");
            assert!(n > 0, "connection closed before {needle:?}");
            buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}"));
}

#[tokio::test]
async fn sse_stream_over_http() {
    let source = Arc::new(ChannelSource::new());
    let pool = BrokerConsumerPool::new(source.clone(), PoolConfig::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_http(
        listener,
        AppState::new(pool.clone(), Duration::from_secs(30), 16),
    ));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /api/stream?topics=telemetry-alerts HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n",
        )
        .await
        .unwrap();

    let mut buf = String::new();
    read_until(&mut stream, &mut buf, "event: connected").await;
    assert!(buf.starts_with("HTTP/1.1 200 OK"), "{buf}");
    assert!(buf.contains("text/event-stream"));
    wait_connected(&pool).await;

    assert!(source.publish("telemetry-alerts", ALERT.as_bytes()));
    read_until(&mut stream, &mut buf, "event: alert").await;
    read_until(&mut stream, &mut buf, "Battery Overheat Detected").await;

    drop(stream);
    // The server notices the closed socket on its next write.
    tokio::time::timeout(Duration::from_secs(5), async {
        while pool.client_count() > 0 {
            source.publish("telemetry-alerts", ALERT.as_bytes());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client removed after the connection closed");
    assert!(pool.is_idle_armed());

    pool.shutdown().await;
}
