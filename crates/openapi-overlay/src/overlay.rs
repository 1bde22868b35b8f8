//! Overlay documents: parsing and structural validation.
//!
//! Two shapes are accepted:
//! - **formal** overlays (`overlay: 1.0.0` style, with `info` and an ordered `actions` list)
//! - **legacy** overlays: a plain partial `OpenAPI` document merged structurally into the base
//!
//! The shape is decided by the presence of the version field. Validation turns the raw tree into
//! a [`ValidatedOverlay`]; nothing is ever applied from an overlay that failed validation.

use crate::document::{INLINE_LOCATION, parse_document};
use crate::error::{OverlayError, Result};
use serde_json::{Map, Value};

/// Top-level keys that make a version-less document recognizable as a legacy overlay.
pub const LEGACY_TOP_LEVEL_KEYS: &[&str] = &["info", "paths", "components", "tags", "servers"];

/// Keys carrying the overlay version. `overlay` is the Overlay Specification name; `version` is
/// accepted as an alias.
const VERSION_KEYS: &[&str] = &["overlay", "version"];

/// A parsed (not yet validated) overlay document.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayDocument {
    location: String,
    raw: Value,
}

/// Overlay metadata (`info`).
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayInfo {
    pub title: String,
    pub version: String,
    pub extensions: Map<String, Value>,
}

/// What an action does to each matched node.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Update(Value),
    Remove,
}

/// One overlay action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub target: String,
    pub description: Option<String>,
    pub kind: ActionKind,
    pub extensions: Map<String, Value>,
}

/// A validated formal overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct FormalOverlay {
    pub version: String,
    pub info: OverlayInfo,
    pub extends: Option<String>,
    pub actions: Vec<Action>,
    pub extensions: Map<String, Value>,
}

/// Result of validation: which engine mode applies to the overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedOverlay {
    Formal(FormalOverlay),
    /// Structural patch; the tree is merged into the base as-is.
    Legacy(Value),
}

impl OverlayDocument {
    /// Parse overlay text (JSON or YAML) without a source location.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Parse`] if the text is not valid JSON/YAML.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_named(text, INLINE_LOCATION)
    }

    /// Parse overlay text and remember where it came from (used in error messages).
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Parse`] if the text is not valid JSON/YAML.
    pub fn parse_named(text: &str, location: &str) -> Result<Self> {
        Ok(Self {
            location: location.to_string(),
            raw: parse_document(text, location)?,
        })
    }

    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        Self {
            location: INLINE_LOCATION.to_string(),
            raw,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Whether the document carries a version field (formal overlay).
    #[must_use]
    pub fn is_formal(&self) -> bool {
        self.raw
            .as_object()
            .is_some_and(|m| VERSION_KEYS.iter().any(|k| m.contains_key(*k)))
    }

    /// Check the structural requirements and produce a typed overlay.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Validation`] describing the first violated requirement.
    pub fn validate(&self) -> Result<ValidatedOverlay> {
        let loc = self.location.as_str();
        let Some(root) = self.raw.as_object() else {
            return Err(OverlayError::validation(
                loc,
                "overlay document must be a mapping",
            ));
        };

        if !self.is_formal() {
            if !LEGACY_TOP_LEVEL_KEYS.iter().any(|k| root.contains_key(*k)) {
                return Err(OverlayError::validation(
                    loc,
                    format!(
                        "missing 'overlay' version and no recognizable OpenAPI keys (expected one of: {})",
                        LEGACY_TOP_LEVEL_KEYS.join(", ")
                    ),
                ));
            }
            tracing::warn!(
                "Overlay '{}' has no version field; applying it as a legacy structural merge",
                loc
            );
            return Ok(ValidatedOverlay::Legacy(self.raw.clone()));
        }

        validate_formal(loc, root).map(ValidatedOverlay::Formal)
    }
}

fn validate_formal(loc: &str, root: &Map<String, Value>) -> Result<FormalOverlay> {
    let mut version = None;
    for key in VERSION_KEYS {
        match root.get(*key) {
            None => {}
            Some(Value::String(v)) => {
                version.get_or_insert_with(|| v.clone());
            }
            Some(_) => {
                return Err(OverlayError::validation(
                    loc,
                    format!("'{key}' version must be a string"),
                ));
            }
        }
    }
    let version = version
        .ok_or_else(|| OverlayError::validation(loc, "missing 'overlay' version"))?;

    let info = root
        .get("info")
        .ok_or_else(|| OverlayError::validation(loc, "missing required 'info'"))?;
    let info = validate_info(loc, info)?;

    let extends = match root.get("extends") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(OverlayError::validation(loc, "'extends' must be a string")),
    };

    let actions = root
        .get("actions")
        .ok_or_else(|| OverlayError::validation(loc, "missing required 'actions'"))?
        .as_array()
        .ok_or_else(|| OverlayError::validation(loc, "'actions' must be a sequence"))?
        .iter()
        .enumerate()
        .map(|(i, a)| validate_action(loc, i, a))
        .collect::<Result<Vec<_>>>()?;

    Ok(FormalOverlay {
        version,
        info,
        extends,
        actions,
        extensions: extensions_of(root),
    })
}

fn validate_info(loc: &str, info: &Value) -> Result<OverlayInfo> {
    let info = info
        .as_object()
        .ok_or_else(|| OverlayError::validation(loc, "'info' must be a mapping"))?;
    let field = |name: &str| {
        match info.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(OverlayError::validation(
                loc,
                format!("'info.{name}' must be a string"),
            )),
            None => Err(OverlayError::validation(
                loc,
                format!("missing required 'info.{name}'"),
            )),
        }
    };
    Ok(OverlayInfo {
        title: field("title")?,
        version: field("version")?,
        extensions: extensions_of(info),
    })
}

fn validate_action(loc: &str, index: usize, action: &Value) -> Result<Action> {
    let err = |msg: &str| OverlayError::validation(loc, format!("actions[{index}]: {msg}"));

    let action = action.as_object().ok_or_else(|| err("must be a mapping"))?;
    let target = match action.get("target") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(err("'target' must be a string")),
        None => return Err(err("missing required 'target'")),
    };
    let description = action
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let remove = match action.get("remove") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(err("'remove' must be a boolean")),
    };
    let kind = match (action.get("update"), remove) {
        (Some(_), true) => return Err(err("'update' and 'remove: true' are mutually exclusive")),
        (None, true) => ActionKind::Remove,
        (Some(update), false) => ActionKind::Update(update.clone()),
        (None, false) => return Err(err("one of 'update' or 'remove: true' is required")),
    };

    Ok(Action {
        target,
        description,
        kind,
        extensions: extensions_of(action),
    })
}

fn extensions_of(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| k.starts_with("x-"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
