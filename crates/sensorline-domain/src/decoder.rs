use crate::error::DecodeError;
use crate::reading::SensorReading;
use chrono::Utc;
use serde::Deserialize;

/// Default truncation limit for payload snippets carried in decode
/// errors.
pub const DEFAULT_SNIPPET_MAX_BYTES: usize = 256;

/// Wire form of a sensor payload. Unknown fields are ignored for
/// forward compatibility.
#[derive(Debug, Deserialize)]
struct SensorReadingWire {
    sensor_id: i32,
    temperature: f64,
    humidity: f64,
    /// Sensor-supplied timestamp. Accepted in any shape and never
    /// trusted; the decoder stamps receive time instead.
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: Option<serde_json::Value>,
}

/// Parses raw message payloads into validated readings.
///
/// Pure parsing: no I/O, no shared state, no acknowledgement calls.
#[derive(Debug, Clone)]
pub struct Decoder {
    snippet_max_bytes: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_SNIPPET_MAX_BYTES)
    }
}

impl Decoder {
    pub fn new(snippet_max_bytes: usize) -> Self {
        Self { snippet_max_bytes }
    }

    /// Decode a payload into a `SensorReading` stamped with the
    /// current wall-clock time.
    ///
    /// Fails on malformed JSON and on missing or wrong-typed
    /// `sensor_id`, `temperature`, or `humidity`.
    pub fn decode(&self, payload: &[u8]) -> Result<SensorReading, DecodeError> {
        let wire: SensorReadingWire =
            serde_json::from_slice(payload).map_err(|e| DecodeError {
                reason: e.to_string(),
                snippet: self.snippet(payload),
            })?;

        Ok(SensorReading {
            sensor_id: wire.sensor_id,
            temperature: wire.temperature,
            humidity: wire.humidity,
            timestamp: Utc::now(),
        })
    }

    fn snippet(&self, payload: &[u8]) -> String {
        let end = payload.len().min(self.snippet_max_bytes);
        String::from_utf8_lossy(&payload[..end]).into_owned()
    }
}
