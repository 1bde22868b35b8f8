//! Config-driven overlay pipeline: load the spec, load overlays, apply them in order.

use crate::config::OverlayPipelineConfig;
use crate::document::{DocumentFormat, parse_document, serialize_document};
use crate::engine::{ApplyReport, apply_all};
use crate::error::Result;
use crate::loader::{SourceLoader, redact_location, verify_spec_hash};
use crate::overlay::OverlayDocument;
use reqwest::Client;
use serde_json::Value;

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The overlaid document.
    pub document: Value,
    /// One report per overlay, in application order.
    pub reports: Vec<ApplyReport>,
    /// Output format requested by the config.
    pub format: DocumentFormat,
}

impl PipelineOutput {
    /// Serialize the document in the configured format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self) -> Result<String> {
        serialize_document(&self.document, self.format)
    }
}

pub struct OverlayPipeline {
    config: OverlayPipelineConfig,
    loader: SourceLoader,
}

impl OverlayPipeline {
    #[must_use]
    pub fn new(config: OverlayPipelineConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    #[must_use]
    pub fn with_client(config: OverlayPipelineConfig, client: Client) -> Self {
        let loader = SourceLoader::new(client, &config.fetch);
        Self { config, loader }
    }

    /// Load the spec and every overlay, then apply the overlays in configured order.
    ///
    /// Overlays are fetched one after another; nothing is applied unless every overlay loaded,
    /// parsed, and validated.
    ///
    /// # Errors
    ///
    /// Returns the first load, hash, parse, or validation error.
    pub async fn run(&self) -> Result<PipelineOutput> {
        let spec_location = self.config.spec.as_str();
        let spec_text = self.loader.load_text(spec_location).await?;
        verify_spec_hash(
            spec_location,
            &spec_text,
            self.config.spec_hash.as_deref(),
            self.config.spec_hash_policy,
        )?;
        let spec = parse_document(&spec_text, &redact_location(spec_location))?;

        let mut overlays = Vec::with_capacity(self.config.overlays.len());
        for location in &self.config.overlays {
            let text = self.loader.load_text(location).await?;
            overlays.push(OverlayDocument::parse_named(
                &text,
                &redact_location(location),
            )?);
        }

        let (document, reports) = apply_all(&spec, &overlays)?;
        for report in &reports {
            tracing::info!(
                "Applied overlay '{}' ({} actions, {} unmatched, {} skipped{})",
                report.location,
                report.actions.len(),
                report.unmatched(),
                report.skipped(),
                if report.legacy { ", legacy" } else { "" }
            );
        }

        Ok(PipelineOutput {
            document,
            reports,
            format: self.config.output,
        })
    }
}
