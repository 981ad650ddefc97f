//! Error types for inspection and replay runs
//!
//! Collaborator failures (sources, parsers, sinks) arrive as `anyhow::Error` and are
//! wrapped with the name of the stream they happened on. Reaching a record ceiling is
//! not an error; see [`FinalizeReason`](super::FinalizeReason).

use thiserror::Error;

use crate::inference::InferenceError;
use crate::state::StateError;

/// Errors that can occur while streaming records
#[derive(Error, Debug)]
pub enum StreamError {
    /// A stream failed to open or errored mid-read
    #[error("Stream '{stream}' failed: {source}")]
    Source {
        stream: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The source could not enumerate its next stream
    #[error("Could not enumerate streams of '{stream_set}': {source}")]
    StreamEnumeration {
        stream_set: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A replayed record references a schema absent from the finalized set
    #[error("Record references unknown schema '{schema_slug}'")]
    SchemaConsistency { schema_slug: String },

    /// A value could not be coerced to its declared type
    #[error(transparent)]
    UnsupportedConversion(#[from] InferenceError),

    /// Raw bytes reached the end of the transform chain
    #[error("Stream '{stream}' produced raw bytes but no transform parses them into records")]
    UnparsedBytes { stream: String },

    /// The sink rejected a batch or commit
    #[error("Sink failed: {source}")]
    Sink {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Saved sink state could not be read or written
    #[error("Sink state error: {0}")]
    State(#[from] StateError),

    /// The replay producer task stopped unexpectedly
    #[error("Replay producer failed: {0}")]
    ProducerFailed(String),
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// Wrap a collaborator failure for a stream
    pub fn source_failure(stream: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Source {
            stream: stream.into(),
            source: error.into(),
        }
    }

    pub fn enumeration_failure(stream_set: impl Into<String>, error: anyhow::Error) -> Self {
        Self::StreamEnumeration {
            stream_set: stream_set.into(),
            source: error.into(),
        }
    }

    pub fn sink_failure(error: anyhow::Error) -> Self {
        Self::Sink {
            source: error.into(),
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            StreamError::Source { source, .. }
            | StreamError::StreamEnumeration { source, .. }
            | StreamError::Sink { source } => has_io_cause(source.as_ref()),
            StreamError::State(err) => err.is_recoverable(),
            _ => false,
        }
    }

    /// Get the stream name if the error belongs to one stream
    pub fn stream_name(&self) -> Option<&str> {
        match self {
            StreamError::Source { stream, .. } | StreamError::UnparsedBytes { stream } => {
                Some(stream)
            }
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            StreamError::Source { stream, source } => {
                format!(
                    "Reading '{stream}' failed: {source}\n\nHint: Check that the source is reachable and the credentials are valid."
                )
            }
            StreamError::SchemaConsistency { schema_slug } => {
                format!(
                    "Record kind '{schema_slug}' was not seen during discovery.\n\nHint: Run discovery again so the schema set matches the source."
                )
            }
            StreamError::UnsupportedConversion(err) => {
                format!("{err}\n\nHint: Choose a different conflict resolution for this field.")
            }
            StreamError::UnparsedBytes { stream } => {
                format!(
                    "No parser is configured for '{stream}'.\n\nHint: Check the file format of the source."
                )
            }
            _ => self.to_string(),
        }
    }
}

fn has_io_cause(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e| e.source()).any(|e| e.is::<std::io::Error>())
}
