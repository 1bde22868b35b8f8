//! Overlay application.
//!
//! The engine is synchronous and stateless: every call deep-copies the target, threads the copy
//! through the overlay's actions in order, and returns it. Callers' documents are never mutated.
//!
//! Failure model:
//! - parse / validation failures are fatal and surface before the target is touched
//! - a failing action (bad path query, type mismatch) is logged and skipped
//! - an action matching nothing is a silent no-op

use crate::document::{DocumentInput, INLINE_LOCATION};
use crate::error::{OverlayError, Result};
use crate::merge::{apply_update, kind_name, legacy_merge};
use crate::overlay::{Action, ActionKind, FormalOverlay, OverlayDocument, ValidatedOverlay};
use crate::path::{NodePath, PathQuery, PathStep};
use serde_json::Value;

/// An overlay supplied as a parsed document, a raw tree, or text.
#[derive(Debug, Clone, Copy)]
pub enum OverlayInput<'a> {
    Document(&'a OverlayDocument),
    Tree(&'a Value),
    Text(&'a str),
}

impl<'a> From<&'a OverlayDocument> for OverlayInput<'a> {
    fn from(value: &'a OverlayDocument) -> Self {
        Self::Document(value)
    }
}

impl<'a> From<&'a Value> for OverlayInput<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Tree(value)
    }
}

impl<'a> From<&'a str> for OverlayInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for OverlayInput<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl OverlayInput<'_> {
    fn validate(self) -> Result<(String, ValidatedOverlay)> {
        match self {
            Self::Document(doc) => Ok((doc.location().to_string(), doc.validate()?)),
            Self::Tree(v) => {
                let doc = OverlayDocument::from_value(v.clone());
                Ok((doc.location().to_string(), doc.validate()?))
            }
            Self::Text(text) => {
                let doc = OverlayDocument::parse(text)?;
                Ok((doc.location().to_string(), doc.validate()?))
            }
        }
    }
}

/// What happened to a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The target matched `matches` nodes and every one was updated/removed.
    Applied { matches: usize },
    /// The target matched nothing.
    NoMatch,
    /// The action failed and was skipped; the document is as it was before the action.
    Skipped { error: String },
}

/// Per-overlay diagnostics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyReport {
    /// Overlay location (file path, URL, or `<inline>`).
    pub location: String,
    /// `true` when the overlay was applied as a legacy structural merge.
    pub legacy: bool,
    /// One entry per action, in action order (empty for legacy overlays).
    pub actions: Vec<ActionOutcome>,
}

impl ApplyReport {
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.actions
            .iter()
            .filter(|o| matches!(o, ActionOutcome::Skipped { .. }))
            .count()
    }

    #[must_use]
    pub fn unmatched(&self) -> usize {
        self.actions
            .iter()
            .filter(|o| matches!(o, ActionOutcome::NoMatch))
            .count()
    }
}

/// Apply one overlay to a target document and return the new document.
///
/// # Errors
///
/// Returns [`OverlayError::Parse`] / [`OverlayError::Validation`] when the target or the overlay
/// cannot be used. Per-action failures are not errors (see [`apply_with_report`]).
pub fn apply<'t, 'o>(
    target: impl Into<DocumentInput<'t>>,
    overlay: impl Into<OverlayInput<'o>>,
) -> Result<Value> {
    apply_with_report(target, overlay).map(|(doc, _)| doc)
}

/// Like [`apply`], also returning per-action diagnostics.
///
/// # Errors
///
/// See [`apply`].
pub fn apply_with_report<'t, 'o>(
    target: impl Into<DocumentInput<'t>>,
    overlay: impl Into<OverlayInput<'o>>,
) -> Result<(Value, ApplyReport)> {
    let (location, overlay) = overlay.into().validate()?;
    let mut doc = target.into().to_owned_tree(INLINE_LOCATION)?;
    let report = apply_validated(&mut doc, &overlay, location);
    Ok((doc, report))
}

/// Apply several overlays strictly in order; each result is the next overlay's target.
///
/// All overlays are validated before any is applied, so a broken overlay anywhere in the list
/// leaves nothing half-applied.
///
/// # Errors
///
/// Returns the first parse/validation error (which names the offending overlay).
pub fn apply_all<'t>(
    target: impl Into<DocumentInput<'t>>,
    overlays: &[OverlayDocument],
) -> Result<(Value, Vec<ApplyReport>)> {
    let validated = overlays
        .iter()
        .map(|o| Ok((o.location().to_string(), o.validate()?)))
        .collect::<Result<Vec<_>>>()?;

    let mut doc = target.into().to_owned_tree(INLINE_LOCATION)?;
    let reports = validated
        .into_iter()
        .map(|(location, overlay)| apply_validated(&mut doc, &overlay, location))
        .collect();
    Ok((doc, reports))
}

/// Apply an already validated overlay to a working document in place.
pub fn apply_validated(doc: &mut Value, overlay: &ValidatedOverlay, location: String) -> ApplyReport {
    match overlay {
        ValidatedOverlay::Legacy(patch) => {
            legacy_merge(doc, patch);
            ApplyReport {
                location,
                legacy: true,
                actions: Vec::new(),
            }
        }
        ValidatedOverlay::Formal(formal) => {
            let actions = apply_actions(doc, formal, &location);
            ApplyReport {
                location,
                legacy: false,
                actions,
            }
        }
    }
}

fn apply_actions(doc: &mut Value, overlay: &FormalOverlay, location: &str) -> Vec<ActionOutcome> {
    overlay
        .actions
        .iter()
        .enumerate()
        .map(|(i, action)| match apply_action(doc, action) {
            Ok(0) => {
                tracing::debug!(
                    "Overlay '{}' action {} ('{}') matched nothing",
                    location,
                    i,
                    action.target
                );
                ActionOutcome::NoMatch
            }
            Ok(matches) => ActionOutcome::Applied { matches },
            Err(e) => {
                tracing::warn!(
                    "Skipping overlay '{}' action {} ('{}'): {}",
                    location,
                    i,
                    action.target,
                    e
                );
                ActionOutcome::Skipped {
                    error: e.to_string(),
                }
            }
        })
        .collect()
}

/// Apply one action. On error the document is left exactly as it was.
///
/// Every match is checked before the first mutation, so a failure never leaves the action
/// half-applied.
fn apply_action(doc: &mut Value, action: &Action) -> Result<usize> {
    let query = PathQuery::parse(&action.target)?;
    let mut matches = query.locate(doc);
    if matches.is_empty() {
        return Ok(0);
    }

    match &action.kind {
        ActionKind::Remove => {
            if matches.iter().any(NodePath::is_root) {
                return Err(OverlayError::Action(
                    "cannot remove the document root".to_string(),
                ));
            }
            // Reverse document order: a descendant goes before its ancestor, and removing a
            // later sibling never shifts an earlier index.
            matches.sort();
            for path in matches.iter().rev() {
                remove_at(doc, path)?;
            }
        }
        ActionKind::Update(update) => {
            // Only a mapping node can reject an update, and only a non-mapping one.
            if !update.is_object()
                && let Some(path) = matches
                    .iter()
                    .find(|p| p.resolve(&*doc).is_some_and(Value::is_object))
            {
                return Err(OverlayError::Action(format!(
                    "{path}: cannot merge {} into an object",
                    kind_name(update)
                )));
            }
            for path in &matches {
                // An earlier match may have replaced an ancestor of this one.
                if let Some(node) = path.resolve_mut(doc) {
                    apply_update(node, update)?;
                }
            }
        }
    }
    Ok(matches.len())
}

fn remove_at(doc: &mut Value, path: &NodePath) -> Result<()> {
    let Some((parent_path, last)) = path.split_last() else {
        return Err(OverlayError::Action(
            "cannot remove the document root".to_string(),
        ));
    };
    let parent = parent_path
        .resolve_mut(doc)
        .ok_or_else(|| OverlayError::Action(format!("parent of {path} disappeared")))?;
    let removed = match (parent, last) {
        (Value::Object(map), PathStep::Key(k)) => map.shift_remove(k).is_some(),
        (Value::Array(arr), PathStep::Index(i)) if *i < arr.len() => {
            arr.remove(*i);
            true
        }
        _ => false,
    };
    if removed {
        Ok(())
    } else {
        Err(OverlayError::Action(format!("cannot remove {path}")))
    }
}
