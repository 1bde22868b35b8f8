use anyhow::Context as _;
use serde_json::{Value, json};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

const SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Petstore API", "version": "1.0.0" },
  "paths": {
    "/pets": { "get": { "summary": "List" } },
    "/internal/metrics": { "get": { "summary": "Metrics" } }
  }
}"#;

const OVERLAY: &str = r"overlay: 1.0.0
info:
  title: Public petstore
  version: 1.0.0
actions:
  - target: $.info
    update:
      title: Modified Petstore API
  - target: $.paths['/internal/metrics']
    remove: true
  - target: $.paths['/pets'].get.summary
    update:
      not: a scalar
  - target: $.info
    update: cannot merge a string into info
";

fn run(config_home: &Path, args: &[&str]) -> anyhow::Result<Output> {
    let bin = env!("CARGO_BIN_EXE_unrelated-openapi-overlay");
    Command::new(bin)
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("RUST_LOG")
        .env_remove("OVERLAY_CONFIG")
        .env_remove("OVERLAY_SPEC")
        .output()
        .context("run overlay cli")
}

#[test]
fn applies_overlay_and_reports_skipped_actions() -> anyhow::Result<()> {
    let dir = tempdir().context("create temp dir")?;
    let spec = dir.path().join("openapi.json");
    let overlay = dir.path().join("public.yaml");
    std::fs::write(&spec, SPEC)?;
    std::fs::write(&overlay, OVERLAY)?;

    let out = run(
        dir.path(),
        &[
            "--spec",
            spec.to_str().context("utf-8 path")?,
            "--overlay",
            overlay.to_str().context("utf-8 path")?,
            "--log-level",
            "error",
        ],
    )?;
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let doc: Value = serde_json::from_slice(&out.stdout).context("parse stdout as json")?;
    assert_eq!(doc["info"]["title"], json!("Modified Petstore API"));
    // Replacing a scalar with a mapping is allowed.
    assert_eq!(doc["paths"]["/pets"]["get"]["summary"], json!({"not": "a scalar"}));
    assert!(doc["paths"].get("/internal/metrics").is_none());

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("1 of 4 action(s) skipped"), "{stderr}");
    assert!(stderr.contains("actions[3]"), "{stderr}");
    Ok(())
}

#[test]
fn config_file_and_yaml_output() -> anyhow::Result<()> {
    let dir = tempdir().context("create temp dir")?;
    let spec = dir.path().join("openapi.json");
    let overlay = dir.path().join("public.yaml");
    let cfg = dir.path().join("overlay-config.yaml");
    let out_file = dir.path().join("out.yaml");
    std::fs::write(&spec, SPEC)?;
    std::fs::write(&overlay, OVERLAY)?;
    std::fs::write(
        &cfg,
        format!(
            "spec: {}\noverlays:\n  - {}\noutput: yaml\n",
            spec.display(),
            overlay.display()
        ),
    )?;

    let out = run(
        dir.path(),
        &[
            "--config",
            cfg.to_str().context("utf-8 path")?,
            "--out",
            out_file.to_str().context("utf-8 path")?,
            "--log-level",
            "error",
        ],
    )?;
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(out.stdout.is_empty());

    let written = std::fs::read_to_string(&out_file)?;
    assert!(written.contains("title: Modified Petstore API"), "{written}");
    assert!(!written.contains("/internal/metrics"), "{written}");
    Ok(())
}

#[test]
fn invalid_overlay_fails_without_output() -> anyhow::Result<()> {
    let dir = tempdir().context("create temp dir")?;
    let spec = dir.path().join("openapi.json");
    let overlay = dir.path().join("broken.yaml");
    std::fs::write(&spec, SPEC)?;
    std::fs::write(
        &overlay,
        "overlay: 1.0.0\ninfo:\n  title: t\n  version: '1'\nactions:\n  - update: {}\n",
    )?;

    let out = run(
        dir.path(),
        &[
            "--spec",
            spec.to_str().context("utf-8 path")?,
            "--overlay",
            overlay.to_str().context("utf-8 path")?,
        ],
    )?;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("missing required 'target'"), "{stderr}");
    Ok(())
}

#[test]
fn missing_spec_is_an_error() -> anyhow::Result<()> {
    let dir = tempdir().context("create temp dir")?;
    let out = run(dir.path(), &[])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no spec given"));
    Ok(())
}
