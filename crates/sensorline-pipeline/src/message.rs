use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Acknowledgement side of a single delivery, owned by the transport.
///
/// Neither call is safe to issue twice for the same delivery; the
/// `AckTracker` guarantees each handle sees exactly one of them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryHandle: Send + Sync {
    /// Positive acknowledgement: processing succeeded, do not redeliver.
    async fn ack(&self) -> Result<(), TransportError>;

    /// Negative acknowledgement: processing failed, redeliver later.
    async fn nack(&self) -> Result<(), TransportError>;
}

/// Pull side of the transport. The concrete broker client lives
/// outside the core and implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next delivery, or `None` once the subscription has ended.
    ///
    /// Transient broker hiccups are the implementation's problem to
    /// retry; an `Err` here is fatal to the pipeline.
    async fn next(&self) -> Result<Option<Delivery>, TransportError>;
}

/// One delivery pulled from the transport: identity, payload, and the
/// handle used to settle it.
pub struct Delivery {
    /// Unique per in-flight message.
    pub id: String,
    pub payload: Bytes,
    pub handle: Arc<dyn DeliveryHandle>,
}

/// A message buffered in the intake queue.
///
/// The delivery handle stays with the tracker; the queue owns only
/// payload and identity, so nothing in the buffer can settle a
/// message behind the tracker's back.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}
