//! Document text handling: format detection, parsing, serialization.
//!
//! Documents (base `OpenAPI` specs and overlays alike) are modeled as `serde_json::Value` trees.
//! YAML input is read into the same tree type so the engine only ever sees one representation.

use crate::error::{OverlayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Location label used when a document has no file path or URL attached.
pub const INLINE_LOCATION: &str = "<inline>";

/// Text serialization of a document.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Guess the format of `text` from its first non-whitespace character.
    ///
    /// `{` or `[` means JSON, anything else YAML. A YAML document that starts with a flow
    /// mapping or flow sequence is therefore read as JSON (and usually fails to parse).
    #[must_use]
    pub fn detect(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{' | '[') => Self::Json,
            _ => Self::Yaml,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// A document supplied either as an already-parsed tree or as raw text.
#[derive(Debug, Clone, Copy)]
pub enum DocumentInput<'a> {
    Tree(&'a Value),
    Text(&'a str),
}

impl<'a> From<&'a Value> for DocumentInput<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Tree(value)
    }
}

impl<'a> From<&'a str> for DocumentInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for DocumentInput<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl DocumentInput<'_> {
    /// Produce an owned tree (a deep copy for `Tree`, a fresh parse for `Text`).
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Parse`] if text input is not valid JSON/YAML.
    pub fn to_owned_tree(self, location: &str) -> Result<Value> {
        match self {
            Self::Tree(v) => Ok(v.clone()),
            Self::Text(text) => parse_document(text, location),
        }
    }
}

/// Parse JSON or YAML text into a document tree.
///
/// # Errors
///
/// Returns [`OverlayError::Parse`] if the text is not valid under the detected format.
pub fn parse_document(text: &str, location: &str) -> Result<Value> {
    let format = DocumentFormat::detect(text);
    let parsed: std::result::Result<Value, String> = match format {
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| OverlayError::Parse {
        location: location.to_string(),
        format: format.as_str(),
        message,
    })
}

/// Serialize a document tree as pretty-printed JSON or as YAML.
///
/// # Errors
///
/// Returns an error if the serializer rejects the tree.
pub fn serialize_document(doc: &Value, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Json => Ok(serde_json::to_string_pretty(doc)?),
        DocumentFormat::Yaml => Ok(serde_yaml::to_string(doc)?),
    }
}
