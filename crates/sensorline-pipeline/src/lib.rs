pub mod error;
pub mod intake;
pub mod message;
pub mod pipeline;
pub mod queue;
pub mod tracker;
pub mod worker;

pub use error::{EnqueueError, TrackerError, TransportError};
pub use intake::run_intake;
pub use message::{Delivery, DeliveryHandle, MessageSource, RawMessage};
pub use pipeline::{IntakePipeline, PipelineConfig};
pub use queue::{intake_queue, IntakeConsumer, IntakeProducer};
pub use tracker::{AckOutcome, AckTracker};
pub use worker::WorkerPool;

#[cfg(any(test, feature = "testing"))]
pub use message::{MockDeliveryHandle, MockMessageSource};
