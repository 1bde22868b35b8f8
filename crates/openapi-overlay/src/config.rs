use crate::document::DocumentFormat;
use crate::error::{OverlayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for an overlay pipeline: one base spec plus an ordered list of overlays.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPipelineConfig {
    /// `OpenAPI` spec location (URL or file path).
    pub spec: String,

    /// Optional spec hash (`sha256:<hex>`) for version detection.
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// Hash policy: warn, fail, or ignore.
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Overlay locations (URLs or file paths), applied in order.
    #[serde(default)]
    pub overlays: Vec<String>,

    /// Output serialization.
    #[serde(default)]
    pub output: DocumentFormat,

    /// Settings for fetching remote specs/overlays.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

/// Remote source settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum response body size (bytes). `None` = unlimited.
    #[serde(default)]
    pub max_response_bytes: Option<usize>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_response_bytes: None,
        }
    }
}

impl OverlayPipelineConfig {
    /// Config for a spec with no overlays and default settings.
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            overlays: Vec::new(),
            output: DocumentFormat::default(),
            fetch: FetchConfig::default(),
        }
    }

    /// Load a config file (YAML or JSON).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not describe a valid config.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OverlayError::SpecReadFile {
                path: path.display().to_string(),
                source: e,
            })?;
        let cfg: Self = serde_yaml::from_str(&content).map_err(|e| {
            OverlayError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check for values serde cannot rule out on its own.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.spec.trim().is_empty() {
            return Err(OverlayError::Config("'spec' must not be empty".to_string()));
        }
        if let Some(i) = self.overlays.iter().position(|o| o.trim().is_empty()) {
            return Err(OverlayError::Config(format!(
                "'overlays[{i}]' must not be empty"
            )));
        }
        if let Some(hash) = &self.spec_hash
            && !hash.starts_with("sha256:")
        {
            return Err(OverlayError::Config(format!(
                "'specHash' must look like 'sha256:<hex>', got '{hash}'"
            )));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(OverlayError::Config(
                "'fetch.timeoutSecs' must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
