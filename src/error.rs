//! Error types shared across the crate.

use thiserror::Error;

/// Result type alias for retrace operations.
pub type RetraceResult<T> = Result<T, RetraceError>;

/// Main error type for retrace operations.
///
/// Per-entry capture problems and inconclusive matcher calls are handled in
/// place (skip and log, retry once) and never surface here; these variants
/// are for failures the pipeline cannot absorb.
#[derive(Error, Debug, Clone)]
pub enum RetraceError {
    /// The capture file could not be read or is not a HAR document.
    #[error("Traffic capture error: {0}")]
    Traffic(String),

    /// A matcher backend failed in a way resolution cannot recover from.
    #[error("Matcher error: {0}")]
    Matcher(String),

    /// An assembled graph violated ordering or acyclicity. Indicates a
    /// resolver bug, never bad input.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Malformed caller-supplied input, such as a `--var` without `=`.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML serialization/deserialization errors.
    #[error("YAML error: {0}")]
    Yaml(String),
}

impl RetraceError {
    /// Create a new traffic capture error.
    pub fn traffic(message: impl Into<String>) -> Self {
        Self::Traffic(message.into())
    }

    /// Create a new matcher error.
    pub fn matcher(message: impl Into<String>) -> Self {
        Self::Matcher(message.into())
    }

    /// Create a new structural error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    /// Create a new invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<std::io::Error> for RetraceError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for RetraceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<serde_yaml::Error> for RetraceError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Yaml(error.to_string())
    }
}
