mod config;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use owo_colors::OwoColorize as _;
use std::io::Write as _;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unrelated_openapi_overlay::pipeline::{OverlayPipeline, PipelineOutput};
use unrelated_openapi_overlay::{ActionOutcome, DocumentFormat};

use crate::config::CliOverrides;

/// Apply OpenAPI Overlay documents to an OpenAPI spec.
#[derive(Debug, Parser)]
#[command(name = "unrelated-openapi-overlay", version, about)]
struct Cli {
    /// Config file (YAML or JSON). Defaults to `$XDG_CONFIG_HOME/unrelated/openapi-overlay.yaml`
    /// when that file exists.
    #[arg(long, env = "OVERLAY_CONFIG")]
    config: Option<PathBuf>,

    /// OpenAPI spec location (file path or URL).
    #[arg(long, env = "OVERLAY_SPEC")]
    spec: Option<String>,

    /// Overlay location (file path or URL). Repeat to apply several overlays in order.
    #[arg(long = "overlay", value_name = "LOCATION")]
    overlays: Vec<String>,

    /// Output format for the resulting document.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the resulting document here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log level / filter directive (overridden by `RUST_LOG`).
    #[arg(long, env = "OVERLAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

impl From<OutputFormat> for DocumentFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Json => DocumentFormat::Json,
            OutputFormat::Yaml => DocumentFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let file_cfg = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => match config::default_config_path() {
            Ok(path) => config::load_config(&path, false)?,
            Err(_) => None,
        },
    };
    let cfg = config::resolve_config(
        file_cfg,
        CliOverrides {
            spec: cli.spec,
            overlays: cli.overlays,
            format: cli.format.map(DocumentFormat::from),
        },
    )?;

    let output = OverlayPipeline::new(cfg)
        .run()
        .await
        .context("apply overlays")?;
    report_skipped_actions(&output);

    let mut rendered = output.render().context("serialize document")?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    match &cli.out {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => std::io::stdout()
            .lock()
            .write_all(rendered.as_bytes())
            .context("write stdout")?,
    }
    Ok(())
}

fn report_skipped_actions(output: &PipelineOutput) {
    for report in &output.reports {
        if report.skipped() == 0 {
            continue;
        }
        eprintln!(
            "{} overlay '{}': {} of {} action(s) skipped",
            "warning:".yellow().bold(),
            report.location,
            report.skipped(),
            report.actions.len()
        );
        for (i, outcome) in report.actions.iter().enumerate() {
            if let ActionOutcome::Skipped { error } = outcome {
                eprintln!("  {} actions[{i}]: {error}", "-".dimmed());
            }
        }
    }
}
