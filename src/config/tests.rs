use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{Settings, SourceKind};
use super::{PartialSettings, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.broker.source, SourceKind::Demo);
    assert_eq!(settings.broker.telemetry_topic, "telemetry-raw");
    assert_eq!(settings.broker.alert_topic, "telemetry-alerts");
    assert_eq!(settings.stream.max_alerts, 50);
    assert_eq!(settings.stream.max_vehicle_age(), Duration::from_secs(5));
    assert_eq!(settings.stream.idle_shutdown(), Duration::from_secs(30));
    assert_eq!(settings.reconnect.max_attempts, 5);
    assert_eq!(settings.reconnect.base_delay_ms, 1_000);
    assert_eq!(settings.reconnect.max_delay_ms, 30_000);
}

#[test]
fn test_empty_partial_merges_to_defaults() {
    let merged = PartialSettings::default().merge(Settings::default());
    assert_eq!(merged, Settings::default());
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("nope");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg, Settings::default());
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let file = tmp.path().join("default.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [broker]
        source = "kafka"
        alert_topic = "alerts"

        [stream]
        max_alerts = 10
        idle_shutdown_secs = 5
    "#;
    fs::write(&file, toml).expect("write config file");

    let base = tmp.path().join("default");
    let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");

    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.ws_port, 8081);
    assert_eq!(cfg.broker.source, SourceKind::Kafka);
    assert_eq!(cfg.broker.alert_topic, "alerts");
    assert_eq!(cfg.broker.telemetry_topic, "telemetry-raw");
    assert_eq!(cfg.stream.max_alerts, 10);
    assert_eq!(cfg.stream.idle_shutdown_secs, 5);
    assert_eq!(cfg.stream.keepalive_secs, 30);
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let base = tmp.path().join("default");

    let cfg = temp_env::with_vars(
        [
            ("TELECAST__STREAM__MAX_ALERTS", Some("7")),
            ("TELECAST__BROKER__GROUP_ID", Some("env-group")),
            ("TELECAST__LOGGING__LEVEL", Some("debug")),
        ],
        || load_config_from(base.to_str().unwrap()),
    )
    .expect("load_config failed");

    assert_eq!(cfg.stream.max_alerts, 7);
    assert_eq!(cfg.broker.group_id, "env-group");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.server.port, 8080);
}
