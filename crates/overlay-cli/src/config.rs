use anyhow::Context as _;
use std::path::{Path, PathBuf};
use unrelated_openapi_overlay::DocumentFormat;
use unrelated_openapi_overlay::config::OverlayPipelineConfig;

/// Command-line values that override (or stand in for) a config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub spec: Option<String>,
    pub overlays: Vec<String>,
    pub format: Option<DocumentFormat>,
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let base = if let Ok(v) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(v)
    } else {
        let home = std::env::var("HOME").context("HOME is not set")?;
        PathBuf::from(home).join(".config")
    };
    Ok(base.join("unrelated").join("openapi-overlay.yaml"))
}

/// Load the config file at `path`. A missing file yields `None` only when `required` is false.
pub fn load_config(path: &Path, required: bool) -> anyhow::Result<Option<OverlayPipelineConfig>> {
    if !required && !path.exists() {
        return Ok(None);
    }
    let cfg = OverlayPipelineConfig::load(path)
        .with_context(|| format!("load config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Combine an optional config file with command-line values (command line wins).
///
/// Overlays given on the command line replace the configured list rather than extending it.
pub fn resolve_config(
    file: Option<OverlayPipelineConfig>,
    cli: CliOverrides,
) -> anyhow::Result<OverlayPipelineConfig> {
    let mut cfg = match (file, cli.spec) {
        (Some(mut cfg), Some(spec)) => {
            cfg.spec = spec;
            cfg
        }
        (Some(cfg), None) => cfg,
        (None, Some(spec)) => OverlayPipelineConfig::new(spec),
        (None, None) => anyhow::bail!("no spec given: pass --spec or a config file with 'spec'"),
    };
    if !cli.overlays.is_empty() {
        cfg.overlays = cli.overlays;
    }
    if let Some(format) = cli.format {
        cfg.output = format;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}
