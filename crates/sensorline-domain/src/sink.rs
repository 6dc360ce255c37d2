use crate::error::SinkError;
use crate::reading::SensorReading;
use async_trait::async_trait;

/// Downstream consumer of validated readings.
///
/// Infrastructure implements this trait; the worker pool calls it
/// concurrently from multiple workers. Delivery is at-least-once, so
/// implementations are expected to be idempotent per reading.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Handle one decoded reading. An error results in a nack and
    /// eventual redelivery by the transport.
    async fn handle(&self, reading: SensorReading) -> Result<(), SinkError>;
}
