//! Error types for value inference and conversion

use thiserror::Error;

/// Errors that can occur while converting discovered values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// A value cannot be coerced to the requested type or format
    #[error("Cannot convert '{value}' to {target}")]
    UnsupportedConversion { value: String, target: String },
}

impl InferenceError {
    pub fn unsupported(value: impl std::fmt::Display, target: impl std::fmt::Display) -> Self {
        InferenceError::UnsupportedConversion {
            value: value.to_string(),
            target: target.to_string(),
        }
    }
}
