//! Loading spec and overlay text from files and URLs.
//!
//! Locations are interpreted as:
//! - `http://` / `https://`: fetched with a GET request
//! - `file://`: converted to a path and read from disk
//! - anything else: a filesystem path

use crate::config::{FetchConfig, HashPolicy};
use crate::error::{OverlayError, Result};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Reads spec/overlay sources. Cheap to clone (the HTTP client is shared).
#[derive(Debug, Clone)]
pub struct SourceLoader {
    client: Client,
    timeout: Duration,
    max_response_bytes: Option<usize>,
}

impl SourceLoader {
    #[must_use]
    pub fn new(client: Client, fetch: &FetchConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(fetch.timeout_secs),
            max_response_bytes: fetch.max_response_bytes,
        }
    }

    /// Load the text behind `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the URL cannot be fetched (including non-2xx
    /// responses), or the body exceeds the configured size limit.
    pub async fn load_text(&self, location: &str) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OverlayError::Config(format!("Invalid URL '{}': {e}", redact_location(location)))
            })?;
            tracing::info!("Fetching {}", redact_url(&url));
            self.fetch(url).await
        } else {
            let path = file_path(location)?;
            tracing::info!("Loading {}", path.display());
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| OverlayError::SpecReadFile {
                    path: path.display().to_string(),
                    source: e,
                })
        }
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        let display = redact_url(&url);
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OverlayError::SpecFetch {
                url: display.clone(),
                message: sanitize_reqwest_error(&e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OverlayError::SpecFetch {
                url: display,
                message: format!("HTTP {status}"),
            });
        }

        read_response_body_limited(resp, self.max_response_bytes)
            .await
            .map_err(|message| OverlayError::SpecReadBody {
                url: display,
                message,
            })
    }
}

fn file_path(location: &str) -> Result<PathBuf> {
    if location.starts_with("file://") {
        let url = Url::parse(location)
            .map_err(|e| OverlayError::Config(format!("Invalid file URL '{location}': {e}")))?;
        return url.to_file_path().map_err(|()| {
            OverlayError::Config(format!(
                "Invalid file URL (cannot convert to path): {location}"
            ))
        });
    }
    Ok(PathBuf::from(location))
}

async fn read_response_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> std::result::Result<String, String> {
    let Some(max) = max_bytes else {
        return response
            .text()
            .await
            .map_err(|e| sanitize_reqwest_error(&e));
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(format!("Response too large: {len} bytes (limit {max})"));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| sanitize_reqwest_error(&e))?
    {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(format!("Response too large: exceeded {max} bytes"));
        }
        out.extend_from_slice(&chunk);
    }

    String::from_utf8(out).map_err(|_| "Response is not valid UTF-8".to_string())
}

/// Check `content` against an expected `sha256:<hex>` digest.
///
/// # Errors
///
/// Returns [`OverlayError::SpecHashMismatch`] on mismatch under [`HashPolicy::Fail`]. Under
/// [`HashPolicy::Warn`] a mismatch is only logged.
pub fn verify_spec_hash(
    location: &str,
    content: &str,
    expected: Option<&str>,
    policy: HashPolicy,
) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if policy == HashPolicy::Ignore {
        return Ok(());
    }
    let actual = spec_hash(content);
    if actual == expected {
        return Ok(());
    }
    match policy {
        HashPolicy::Fail => Err(OverlayError::SpecHashMismatch {
            location: redact_location(location),
            expected: expected.to_string(),
            actual,
        }),
        HashPolicy::Warn => {
            tracing::warn!(
                "Spec hash mismatch for '{}'. Expected: {}, Got: {}",
                redact_location(location),
                expected,
                actual
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

/// `sha256:<hex>` digest of `content`.
#[must_use]
pub fn spec_hash(content: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content)))
}

fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Location safe to log: URLs lose credentials and query strings, paths pass through.
#[must_use]
pub fn redact_location(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => redact_url(&url),
        _ => location.to_string(),
    }
}

fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::fs;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    const OVERLAY_YAML: &str = "overlay: 1.0.0\ninfo:\n  title: t\n  version: '1'\nactions: []\n";

    async fn serve(app: Router) -> (String, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move { server.await });
        (format!("http://{addr}"), shutdown_tx)
    }

    fn loader(max_response_bytes: Option<usize>) -> SourceLoader {
        SourceLoader::new(
            Client::new(),
            &FetchConfig {
                timeout_secs: 5,
                max_response_bytes,
            },
        )
    }

    #[tokio::test]
    async fn loads_plain_paths_and_file_urls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overlay.yaml");
        fs::write(&path, OVERLAY_YAML).unwrap();

        let loader = loader(None);
        let text = loader.load_text(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, OVERLAY_YAML);

        let file_url = Url::from_file_path(&path).unwrap().to_string();
        let text = loader.load_text(&file_url).await.unwrap();
        assert_eq!(text, OVERLAY_YAML);
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = loader(None)
            .load_text(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::SpecReadFile { .. }));
    }

    #[tokio::test]
    async fn fetches_over_http() {
        let app = Router::new()
            .route("/overlay.yaml", get(|| async { OVERLAY_YAML }))
            .route(
                "/gone",
                get(|| async { (StatusCode::NOT_FOUND, "not here") }),
            );
        let (base, shutdown) = serve(app).await;

        let loader = loader(None);
        let text = loader
            .load_text(&format!("{base}/overlay.yaml?token=secret"))
            .await
            .unwrap();
        assert_eq!(text, OVERLAY_YAML);

        let err = loader
            .load_text(&format!("{base}/gone?token=secret"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, OverlayError::SpecFetch { .. }));
        assert!(msg.contains("404"), "{msg}");
        assert!(!msg.contains("secret"), "{msg}");

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn enforces_response_size_limit() {
        let app = Router::new().route("/big", get(|| async { "x".repeat(4096) }));
        let (base, shutdown) = serve(app).await;

        let err = loader(Some(1024))
            .load_text(&format!("{base}/big"))
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::SpecReadBody { .. }));
        assert!(err.to_string().contains("too large"));

        let _ = shutdown.send(());
    }

    #[test]
    fn spec_hash_policies() {
        let content = "openapi: 3.0.0\n";
        let good = spec_hash(content);
        assert!(good.starts_with("sha256:"));
        assert_eq!(good.len(), "sha256:".len() + 64);

        assert!(verify_spec_hash("s", content, Some(&good), HashPolicy::Fail).is_ok());
        assert!(verify_spec_hash("s", content, None, HashPolicy::Fail).is_ok());
        assert!(verify_spec_hash("s", content, Some("sha256:00"), HashPolicy::Warn).is_ok());
        assert!(verify_spec_hash("s", content, Some("sha256:00"), HashPolicy::Ignore).is_ok());
        let err =
            verify_spec_hash("s", content, Some("sha256:00"), HashPolicy::Fail).unwrap_err();
        assert!(matches!(err, OverlayError::SpecHashMismatch { .. }));
    }

    #[test]
    fn redacts_credentials_and_query() {
        assert_eq!(
            redact_location("https://user:pw@example.com/o.yaml?token=t#frag"),
            "https://example.com/o.yaml"
        );
        assert_eq!(redact_location("./overlays/a.yaml"), "./overlays/a.yaml");
    }
}
