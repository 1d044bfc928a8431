//! Error types surfaced by the aggregation pipeline.
//!
//! None of these are fatal to a running pipeline: callers log and move on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input that could not be decoded into a ride event.
    #[error("malformed message at offset {offset}: {reason}")]
    MalformedMessage { offset: u64, reason: String },

    /// A notification sink rejected or failed to deliver a message.
    #[error("sink '{sink}' failed: {source}")]
    Sink {
        sink: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("checkpoint {path}: {source}")]
    Checkpoint {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("event source {location}: {source}")]
    Source {
        location: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
