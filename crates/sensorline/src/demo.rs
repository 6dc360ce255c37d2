//! In-process stand-ins for the external transport and sink, used by
//! the daemon so the pipeline is observable without a broker: a demo
//! source emitting synthetic sensor payloads on an interval, and a
//! sink that logs each decoded reading.

use async_trait::async_trait;
use bytes::Bytes;
use sensorline_domain::{ReadingSink, SensorReading, SinkError};
use sensorline_pipeline::{Delivery, DeliveryHandle, MessageSource, TransportError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DemoSourceConfig {
    pub interval: Duration,
    /// Every Nth payload is intentionally malformed so the nack path
    /// stays visible; 0 disables.
    pub malformed_every: u32,
}

struct DemoState {
    ticker: Interval,
    counter: u64,
}

/// Generates one synthetic sensor delivery per tick.
pub struct DemoSource {
    state: Mutex<DemoState>,
    malformed_every: u32,
}

impl DemoSource {
    pub fn new(config: DemoSourceConfig) -> Self {
        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            state: Mutex::new(DemoState { ticker, counter: 0 }),
            malformed_every: config.malformed_every,
        }
    }

    fn payload_for(&self, n: u64) -> Bytes {
        if self.malformed_every > 0 && n % u64::from(self.malformed_every) == 0 {
            return Bytes::from_static(b"{\"sensor_id\":\"garbled");
        }
        let value = serde_json::json!({
            "sensor_id": (n % 100) as i32,
            "temperature": 18.0 + (n % 12) as f64 * 0.5,
            "humidity": 40.0 + (n % 30) as f64,
            // Sensor-supplied timestamp; the decoder discards it.
            "timestamp": "1970-01-01T00:00:00Z",
        });
        Bytes::from(value.to_string())
    }
}

#[async_trait]
impl MessageSource for DemoSource {
    async fn next(&self) -> Result<Option<Delivery>, TransportError> {
        let n = {
            let mut state = self.state.lock().await;
            state.ticker.tick().await;
            state.counter += 1;
            state.counter
        };

        let id = format!("demo-{n}");
        debug!(message_id = %id, "generated demo delivery");
        Ok(Some(Delivery {
            id: id.clone(),
            payload: self.payload_for(n),
            handle: Arc::new(LoggingHandle { id }),
        }))
    }
}

/// Settlement end of a demo delivery; a real transport would forward
/// these to the broker.
struct LoggingHandle {
    id: String,
}

#[async_trait]
impl DeliveryHandle for LoggingHandle {
    async fn ack(&self) -> Result<(), TransportError> {
        debug!(message_id = %self.id, "demo delivery acked");
        Ok(())
    }

    async fn nack(&self) -> Result<(), TransportError> {
        warn!(message_id = %self.id, "demo delivery nacked");
        Ok(())
    }
}

/// Logs each decoded reading, which is all the original consumer did
/// with them.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReadingSink for LogSink {
    async fn handle(&self, reading: SensorReading) -> Result<(), SinkError> {
        info!(
            sensor_id = reading.sensor_id,
            temperature = reading.temperature,
            humidity = reading.humidity,
            timestamp = %reading.timestamp.to_rfc3339(),
            "received sensor reading"
        );
        Ok(())
    }
}
