use super::decoder::batch;
use super::*;
use crate::broker::topic::Topics;
use crate::utils::error::DecodeError;

fn decoder() -> TelemetryDecoder {
    TelemetryDecoder::new(Topics::new("telemetry-raw", "telemetry-alerts"))
}

#[test]
fn test_decode_full_record() {
    let payload = encode_batch(&batch(
        "RVN000000001",
        1_700_000_000_000,
        [
            ("Latitude", 37.7),
            ("Longitude", -122.4),
            ("Speed", 55.0),
            ("TemperatureAverage", 42.0),
        ],
    ));

    match decoder().decode("telemetry-raw", &payload) {
        Decoded::Record(record) => {
            assert_eq!(record.vin, "RVN000000001");
            assert_eq!(record.lat, 37.7);
            assert_eq!(record.lon, -122.4);
            assert_eq!(record.speed, 55.0);
            assert_eq!(record.temp, 42.0);
            assert_eq!(record.timestamp, 1_700_000_000_000);
        }
        other => panic!("expected a record, got {other:?}"),
    }
}

#[test]
fn test_decode_fleet_sensor_ids() {
    let payload = encode_batch(&batch(
        "RVN000000002",
        0,
        [
            (sensors::SPEED, 88.0),
            (sensors::BATTERY_TEMP, 61.5),
            (sensors::TIRE_PRESSURE, 33.0),
            (sensors::LATITUDE, 37.8),
            (sensors::LONGITUDE, -122.45),
        ],
    ));

    let Decoded::Record(record) = decoder().decode("telemetry-raw", &payload) else {
        panic!("expected a record");
    };
    assert_eq!(record.speed, 88.0);
    assert_eq!(record.temp, 61.5);
    assert_eq!(record.lat, 37.8);
    assert_eq!(record.lon, -122.45);
}

#[test]
fn test_missing_coordinate_is_incomplete() {
    let no_lat = encode_batch(&batch("V1", 0, [("Longitude", -122.4), ("Speed", 10.0)]));
    let no_lon = encode_batch(&batch("V2", 0, [("Latitude", 37.7), ("Speed", 10.0)]));

    assert!(matches!(
        decoder().decode("telemetry-raw", &no_lat),
        Decoded::Incomplete { vin } if vin == "V1"
    ));
    assert!(matches!(
        decoder().decode("telemetry-raw", &no_lon),
        Decoded::Incomplete { vin } if vin == "V2"
    ));
}

#[test]
fn test_missing_speed_and_temp_default_to_zero() {
    let b = batch("V3", 0, [("Latitude", 1.0), ("Longitude", 2.0)]);
    let record = extract_record(&b).expect("record");
    assert_eq!(record.speed, 0.0);
    assert_eq!(record.temp, 0.0);
}

#[test]
fn test_unmatched_points_are_ignored() {
    let b = batch(
        "V4",
        0,
        [
            ("Latitude", 1.0),
            ("Longitude", 2.0),
            ("Vehicle.Cabin.Temperature", 99.0),
            (sensors::TIRE_PRESSURE, 31.0),
        ],
    );
    let record = extract_record(&b).expect("record");
    assert_eq!(record.temp, 0.0);
}

#[test]
fn test_malformed_payload_is_decode_error() {
    let garbage = [0xff, 0xff, 0xff, 0xff, 0x0f];
    assert!(matches!(
        decoder().decode("telemetry-raw", &garbage),
        Decoded::Error(DecodeError::Malformed(_))
    ));
}

#[test]
fn test_empty_vehicle_id_is_rejected() {
    let payload = encode_batch(&batch("", 0, [("Latitude", 1.0), ("Longitude", 2.0)]));
    assert!(matches!(
        decode_batch(&payload),
        Err(DecodeError::MissingVehicleId)
    ));
}

#[test]
fn test_alert_passes_through_unmodified() {
    let raw = r#"{"vehicle_id":"RVN1","type":"CRITICAL","message":"Battery Overheat Detected","value":61.2,"timestamp":1700000000000}"#;

    let Decoded::Passthrough(alert) = decoder().decode("telemetry-alerts", raw.as_bytes()) else {
        panic!("expected passthrough");
    };
    assert_eq!(&*alert.raw, raw);
    assert!(alert.is_critical());
    let record = alert.record.expect("typed alert");
    assert_eq!(record.kind, AlertKind::Critical);
    assert_eq!(record.vehicle_id, "RVN1");
}

#[test]
fn test_domain_specific_alert_type() {
    let raw = r#"{"vehicle_id":"V","type":"BATTERY_OVERHEAT","message":"m","value":1.0,"timestamp":1}"#;
    let Decoded::Passthrough(alert) = decoder().decode("telemetry-alerts", raw.as_bytes()) else {
        panic!("expected passthrough");
    };
    assert_eq!(
        alert.record.unwrap().kind,
        AlertKind::Other("BATTERY_OVERHEAT".to_string())
    );
}

#[test]
fn test_alert_with_foreign_shape_still_passes_through() {
    let raw = r#"{"vehicleId":"DEMO-4","severity":"WARNING"}"#;
    let Decoded::Passthrough(alert) = decoder().decode("telemetry-alerts", raw.as_bytes()) else {
        panic!("expected passthrough");
    };
    assert_eq!(&*alert.raw, raw);
    assert!(alert.record.is_none());
    assert!(!alert.is_critical());
}

#[test]
fn test_non_object_alert_is_rejected() {
    assert!(matches!(
        decoder().decode("telemetry-alerts", b"[1,2,3]"),
        Decoded::Error(DecodeError::InvalidAlert(_))
    ));
    assert!(matches!(
        decoder().decode("telemetry-alerts", b"not json"),
        Decoded::Error(DecodeError::InvalidAlert(_))
    ));
    assert!(matches!(
        decoder().decode("telemetry-alerts", &[0xc3, 0x28]),
        Decoded::Error(DecodeError::InvalidUtf8(_))
    ));
}

#[test]
fn test_unknown_topic_is_unrouted() {
    assert!(matches!(
        decoder().decode("something-else", b"{}"),
        Decoded::Unrouted { topic } if topic == "something-else"
    ));
}

#[test]
fn test_record_serializes_without_timestamp() {
    let record = TelemetryRecord {
        vin: "V".to_string(),
        lat: 1.0,
        lon: 2.0,
        speed: 3.0,
        temp: 4.0,
        timestamp: 99,
    };
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"vin": "V", "lat": 1.0, "lon": 2.0, "speed": 3.0, "temp": 4.0})
    );
}
