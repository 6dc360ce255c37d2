use chrono::{DateTime, Utc};
use serde::Serialize;

/// A validated sensor reading.
///
/// Exists only after a successful decode and is immutable from then
/// on. The timestamp is the receive-side wall clock; any value the
/// sensor supplied on the wire is discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub sensor_id: i32,
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}
