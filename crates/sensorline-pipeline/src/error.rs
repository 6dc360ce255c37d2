use thiserror::Error;

/// Acknowledgement bookkeeping violation.
///
/// Programming-error class: either the transport delivered two
/// in-flight messages with the same id, or something tried to settle
/// a message twice. Logged at error severity and surfaced to the
/// caller; never silently swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("message id already tracked: {0}")]
    DuplicateId(String),

    #[error("message id not tracked (settled twice or never tracked): {0}")]
    UnknownId(String),
}

/// Transport-side failure.
///
/// A failure during startup or from the pull loop is fatal to the
/// pipeline; transient mid-stream errors are expected to be retried
/// inside the transport implementation and never reach the core.
#[derive(Error, Debug)]
#[error("transport error: {0}")]
pub struct TransportError(#[from] pub anyhow::Error);

/// The intake queue was closed before the message could be buffered.
#[derive(Error, Debug)]
#[error("intake queue closed, message {id} not enqueued")]
pub struct EnqueueError {
    pub id: String,
}
