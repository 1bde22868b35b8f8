//! `OpenAPI` Overlay engine.
//!
//! Applies overlay documents (ordered JSONPath-targeted `update` / `remove` actions, or legacy
//! structural patches) to an `OpenAPI` document before it is turned into MCP tools.
//!
//! This crate is intended to be used by:
//! - `unrelated-openapi-overlay-cli` (standalone overlay tool)
//! - `OpenAPI` tool sources that accept an `overlays` list
//!
//! The engine ([`engine`]) is synchronous and performs no I/O; loading specs and overlays from
//! files or URLs lives in [`loader`] and [`pipeline`].

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod loader;
pub mod merge;
pub mod overlay;
pub mod path;
pub mod pipeline;

pub use document::{DocumentFormat, DocumentInput, parse_document, serialize_document};
pub use engine::{ActionOutcome, ApplyReport, OverlayInput, apply, apply_all, apply_with_report};
pub use error::{OverlayError, Result};
pub use overlay::{OverlayDocument, ValidatedOverlay};
