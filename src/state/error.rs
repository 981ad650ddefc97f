//! Error types for sink state persistence

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or saving sink state
#[derive(Error, Debug)]
pub enum StateError {
    /// IO error with path context
    #[error("IO error with {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State document is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key component that cannot be used as a path segment
    #[error("Invalid state key component: '{0}'")]
    InvalidKey(String),
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;

impl StateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StateError::Io { .. })
    }
}
