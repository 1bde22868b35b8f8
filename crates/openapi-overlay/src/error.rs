//! Error types for `unrelated-openapi-overlay`.

use thiserror::Error;

/// Main error type for overlay loading and application.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// Input text is neither valid JSON nor valid YAML (under the detected format).
    #[error("Parse error: failed to parse '{location}' as {format}: {message}")]
    Parse {
        location: String,
        format: &'static str,
        message: String,
    },

    /// Overlay document violates the structural requirements (nothing was applied).
    #[error("Validation error: overlay '{location}': {message}")]
    Validation { location: String, message: String },

    /// Malformed path-query expression.
    #[error("Path error: invalid path query '{expr}': {message}")]
    Path { expr: String, message: String },

    /// A single action could not be applied (type mismatch, unremovable node, ...).
    #[error("Action error: {0}")]
    Action(String),

    /// Configuration errors (invalid config, missing fields, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Overlay error: failed to fetch '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("Overlay error: failed to read body from '{url}': {message}")]
    SpecReadBody { url: String, message: String },

    #[error("Overlay error: failed to read file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Spec hash mismatch for '{location}'. Expected: {expected}, Got: {actual}")]
    SpecHashMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    /// JSON serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OverlayError {
    pub(crate) fn validation(location: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            location: location.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn path(expr: &str, message: impl Into<String>) -> Self {
        Self::Path {
            expr: expr.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error is fatal for an `apply` call (as opposed to a per-action failure).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Path { .. } | Self::Action(_))
    }
}

/// Result type alias for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
