//! Wire types of the binary telemetry batch.
//!
//! Batches are protobuf-encoded by the ingest side:
//!
//! ```text
//! message TelemetryBatch { string vehicle_id = 1; int64 timestamp = 2; repeated DataPoint points = 3; }
//! message DataPoint      { string sensor_id = 1; double value = 2; }
//! ```

/// One vehicle's batch of sensor readings.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TelemetryBatch {
    #[prost(string, tag = "1")]
    pub vehicle_id: String,
    /// Milliseconds since the UNIX epoch, producer clock.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(message, repeated, tag = "3")]
    pub points: Vec<DataPoint>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DataPoint {
    #[prost(string, tag = "1")]
    pub sensor_id: String,
    #[prost(double, tag = "2")]
    pub value: f64,
}

impl DataPoint {
    pub fn new(sensor_id: impl Into<String>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value,
        }
    }
}

/// Full sensor identifiers emitted by the vehicle fleet.
pub mod sensors {
    pub const SPEED: &str = "Vehicle.Speed";
    pub const BATTERY_TEMP: &str = "Vehicle.Powertrain.TractionBattery.Temperature.Average";
    pub const TIRE_PRESSURE: &str = "Vehicle.Chassis.Axle.Row1.Wheel.Left.Tire.Pressure";
    pub const LATITUDE: &str = "Vehicle.CurrentLocation.Latitude";
    pub const LONGITUDE: &str = "Vehicle.CurrentLocation.Longitude";
}
