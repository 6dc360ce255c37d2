use thiserror::Error;

/// Payload rejected by the decoder.
///
/// Terminal for the message: the pipeline nacks it and never retries
/// locally. The snippet is truncated at decode time so log volume
/// stays bounded regardless of payload size.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed sensor payload: {reason} (snippet: {snippet:?})")]
pub struct DecodeError {
    pub reason: String,
    pub snippet: String,
}

/// Downstream processing failure reported by a sink.
///
/// The pipeline nacks the message and relies on transport redelivery
/// for any retry.
#[derive(Error, Debug)]
#[error("sink failed to handle reading: {0}")]
pub struct SinkError(#[from] pub anyhow::Error);
