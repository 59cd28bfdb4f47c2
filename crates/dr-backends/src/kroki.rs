//! Kroki HTTP backend.
//!
//! Diagram source is POSTed to `{url}/{diagram_type}/{format}` as plain text;
//! the response body is the rendered diagram. The diagram type comes from the
//! `diagram_type` option (or config), defaulting to `mermaid`. A theme is sent
//! as the `Kroki-Diagram-Options-theme` header.
//!
//! Requests are bounded by the attempt's remaining time and run on a helper
//! thread, so cancellation returns at once. The abandoned request is dropped
//! when its own timeout fires.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use dr_renderer::{
    Capability, FailureKind, RegistryError, RenderContent, RenderContext, RenderOutcome,
    RenderRequest, Renderer, RendererConfig, RendererFactory, RendererInfo,
};
use serde_json::Value;
use ureq::Agent;

use crate::command::unsupported_format;

pub const NAME: &str = "kroki";

/// Default Kroki diagram type.
pub const DEFAULT_DIAGRAM_TYPE: &str = "mermaid";

/// Request timeout when the attempt has no deadline.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a waiting attempt re-checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const FORMATS: [&str; 4] = ["svg", "png", "pdf", "jpeg"];

/// Settings for the Kroki backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KrokiSettings {
    /// Server URL. The backend is unavailable without one.
    pub url: Option<String>,
    pub priority: i32,
}

impl Default for KrokiSettings {
    fn default() -> Self {
        Self {
            url: None,
            priority: 30,
        }
    }
}

fn info(priority: i32) -> RendererInfo {
    RendererInfo::new(NAME)
        .with_description("Kroki diagram rendering service")
        .with_formats(FORMATS)
        .with_capability(Capability::RemoteRendering)
        .with_capability(Capability::ThemeSupport)
        .with_priority(priority)
        .with_dependency("kroki server")
}

/// Create HTTP agent with the specified timeout.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Extract width and height from PNG image data.
///
/// PNG format: 8-byte signature, then IHDR chunk with width/height at bytes 16-24.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || &data[0..8] != b"\x89PNG\r\n\x1a\n" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Kroki endpoints are lowercase identifiers like `mermaid` or `c4plantuml`.
fn is_valid_diagram_type(diagram_type: &str) -> bool {
    !diagram_type.is_empty()
        && diagram_type
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Renders through a Kroki server.
#[derive(Debug)]
pub struct KrokiRenderer {
    info: RendererInfo,
    url: Option<String>,
    diagram_type: String,
}

impl KrokiRenderer {
    fn endpoint(&self, url: &str, request: &RenderRequest<'_>) -> Result<String, String> {
        let diagram_type = request
            .option_str("diagram_type")
            .unwrap_or(&self.diagram_type);
        if !is_valid_diagram_type(diagram_type) {
            return Err(format!("invalid diagram type '{diagram_type}'"));
        }
        Ok(format!("{url}/{diagram_type}/{}", request.format))
    }

    /// Send the diagram and return the response body.
    ///
    /// Handles HTTP errors by reading the response body for error details.
    fn send(
        endpoint: &str,
        source: &str,
        theme: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<u8>, String> {
        let agent = create_agent(timeout);
        let mut post = agent.post(endpoint).header("Content-Type", "text/plain");
        if let Some(theme) = theme {
            post = post.header("Kroki-Diagram-Options-theme", theme);
        }
        let response = post
            .send(source.as_bytes())
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();
        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(format!("HTTP {status}: {}", error_body.trim()));
        }
        body.read_to_vec().map_err(|e| format!("I/O error: {e}"))
    }

    /// [`send`](Self::send) on a helper thread, waiting until it answers or
    /// `ctx` is interrupted.
    fn send_interruptible(
        endpoint: &str,
        request: &RenderRequest<'_>,
        timeout: Duration,
        ctx: &RenderContext,
    ) -> Result<Result<Vec<u8>, String>, FailureKind> {
        let (tx, rx) = mpsc::channel();
        let endpoint = endpoint.to_owned();
        let source = request.source.to_owned();
        let theme = request.theme.map(str::to_owned);
        let spawned = thread::Builder::new()
            .name("dr-kroki-request".to_owned())
            .spawn(move || {
                // The receiver is gone if the attempt was interrupted
                let _ = tx.send(Self::send(&endpoint, &source, theme.as_deref(), timeout));
            });
        if let Err(e) = spawned {
            return Ok(Err(format!("failed to spawn request thread: {e}")));
        }

        loop {
            let wait = ctx
                .remaining()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));
            match rx.recv_timeout(wait) {
                Ok(result) => return Ok(result),
                Err(RecvTimeoutError::Disconnected) => {
                    return Ok(Err("request thread exited without a result".to_owned()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(kind) = ctx.interruption() {
                        return Err(kind);
                    }
                }
            }
        }
    }
}

impl Renderer for KrokiRenderer {
    fn info(&self) -> &RendererInfo {
        &self.info
    }

    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome {
        if !self.supports_format(request.format) {
            return unsupported_format(NAME, request.format);
        }
        let Some(url) = &self.url else {
            return RenderOutcome::failure(
                NAME,
                request.format,
                FailureKind::NotAvailable,
                "no Kroki URL configured",
            );
        };
        let endpoint = match self.endpoint(url, request) {
            Ok(endpoint) => endpoint,
            Err(message) => {
                return RenderOutcome::failure(NAME, request.format, FailureKind::Rendering, message);
            }
        };
        if let Some(kind) = ctx.interruption() {
            return RenderOutcome::failure(NAME, request.format, kind, "interrupted before request");
        }

        let timeout = ctx.remaining().unwrap_or(DEFAULT_HTTP_TIMEOUT);
        tracing::debug!(endpoint = %endpoint, timeout_ms = timeout.as_millis(), "Kroki request");

        let sent = match Self::send_interruptible(&endpoint, request, timeout, ctx) {
            Ok(sent) => sent,
            Err(kind) => {
                tracing::debug!(endpoint = %endpoint, kind = %kind, "Abandoned Kroki request");
                let message = match kind {
                    FailureKind::Timeout => "timed out",
                    _ => "cancelled",
                };
                return RenderOutcome::failure(NAME, request.format, kind, message);
            }
        };
        match sent {
            Ok(bytes) => {
                let size = bytes.len();
                let dimensions = (request.format == "png")
                    .then(|| png_dimensions(&bytes))
                    .flatten();
                let mut outcome = RenderOutcome::success(
                    NAME,
                    request.format,
                    RenderContent::from_bytes(request.format, bytes),
                )
                .with_metadata("endpoint", endpoint)
                .with_metadata("bytes", size);
                if let Some((width, height)) = dimensions {
                    outcome = outcome
                        .with_metadata("width", width)
                        .with_metadata("height", height);
                }
                outcome
            }
            Err(message) => {
                // The deadline may have fired while the request was in flight
                let kind = ctx.interruption().unwrap_or(FailureKind::Rendering);
                RenderOutcome::failure(NAME, request.format, kind, message)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.url.is_some()
    }
}

/// Factory for [`KrokiRenderer`].
///
/// Config overrides: `url`, `diagram_type`.
#[derive(Debug, Clone, Default)]
pub struct KrokiFactory {
    settings: KrokiSettings,
}

impl KrokiFactory {
    pub fn new(settings: KrokiSettings) -> Self {
        Self { settings }
    }
}

fn config_string(config: &RendererConfig, key: &str) -> Result<Option<String>, RegistryError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(RegistryError::Configuration {
            renderer: NAME.to_owned(),
            message: format!("{key} must be a string, got {other}"),
        }),
    }
}

impl RendererFactory for KrokiFactory {
    fn info(&self) -> RendererInfo {
        info(self.settings.priority)
    }

    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        let url = config_string(config, "url")?.or_else(|| self.settings.url.clone());
        if let Some(url) = &url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(RegistryError::Configuration {
                renderer: NAME.to_owned(),
                message: format!("url must start with http:// or https://, got '{url}'"),
            });
        }
        let diagram_type = config_string(config, "diagram_type")?
            .unwrap_or_else(|| DEFAULT_DIAGRAM_TYPE.to_owned());

        Ok(Arc::new(KrokiRenderer {
            info: info(self.settings.priority),
            url: url.map(|u| u.trim_end_matches('/').to_owned()),
            diagram_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use dr_renderer::{CancelToken, RenderOptions};
    use serde_json::json;

    use super::*;

    fn kroki(url: Option<&str>) -> Arc<dyn Renderer> {
        KrokiFactory::new(KrokiSettings {
            url: url.map(str::to_owned),
            priority: 30,
        })
        .create(&RendererConfig::new())
        .unwrap()
    }

    fn request<'a>(
        format: &'a str,
        config: &'a RendererConfig,
        options: &'a RenderOptions,
    ) -> RenderRequest<'a> {
        RenderRequest {
            source: "graph TD; A-->B",
            format,
            theme: None,
            config,
            options,
        }
    }

    #[test]
    fn test_unavailable_without_url() {
        let renderer = kroki(None);
        assert!(!renderer.is_available());

        let config = RendererConfig::new();
        let options = RenderOptions::new();
        let outcome = renderer.render(&request("svg", &config, &options), &RenderContext::new());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotAvailable));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let mut config = RendererConfig::new();
        config.insert("url".to_owned(), json!("ftp://kroki.example"));

        let result = KrokiFactory::default().create(&config);
        assert!(matches!(result, Err(RegistryError::Configuration { .. })));
    }

    #[test]
    fn test_endpoint() {
        let renderer = KrokiRenderer {
            info: info(30),
            url: Some("https://kroki.io".to_owned()),
            diagram_type: DEFAULT_DIAGRAM_TYPE.to_owned(),
        };
        let config = RendererConfig::new();
        let mut options = RenderOptions::new();

        let endpoint = renderer
            .endpoint("https://kroki.io", &request("svg", &config, &options))
            .unwrap();
        assert_eq!(endpoint, "https://kroki.io/mermaid/svg");

        options.insert("diagram_type".to_owned(), json!("plantuml"));
        let endpoint = renderer
            .endpoint("https://kroki.io", &request("png", &config, &options))
            .unwrap();
        assert_eq!(endpoint, "https://kroki.io/plantuml/png");

        options.insert("diagram_type".to_owned(), json!("../admin"));
        assert!(renderer
            .endpoint("https://kroki.io", &request("png", &config, &options))
            .is_err());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let mut config = RendererConfig::new();
        config.insert("url".to_owned(), json!("http://localhost:8000/"));
        let renderer = KrokiFactory::default().create(&config).unwrap();
        assert!(renderer.is_available());
    }

    #[test]
    fn test_unreachable_server_is_rendering_failure() {
        // Port 1 is reserved and refuses connections
        let renderer = kroki(Some("http://127.0.0.1:1"));
        let config = RendererConfig::new();
        let options = RenderOptions::new();
        let ctx = RenderContext::new().with_timeout(Duration::from_secs(5));

        let outcome = renderer.render(&request("svg", &config, &options), &ctx);
        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Rendering));
        assert!(outcome.error().unwrap().contains("HTTP error"));
    }

    #[test]
    fn test_cancellation_abandons_request_in_flight() {
        // Accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let renderer = kroki(Some(&url));
        let config = RendererConfig::new();
        let options = RenderOptions::new();

        let token = CancelToken::new();
        let ctx = RenderContext::new().with_cancel_token(token.clone());
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = renderer.render(&request("svg", &config, &options), &ctx);
        canceller.join().unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }

    #[test]
    fn test_deadline_bounds_silent_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let renderer = kroki(Some(&url));
        let config = RendererConfig::new();
        let options = RenderOptions::new();
        let ctx = RenderContext::new().with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let outcome = renderer.render(&request("svg", &config, &options), &ctx);

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }

    #[test]
    fn test_png_dimensions() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(&[0, 0, 0, 13]);
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&200u32.to_be_bytes());
        png.extend_from_slice(&100u32.to_be_bytes());

        assert_eq!(png_dimensions(&png), Some((200, 100)));
        assert_eq!(png_dimensions(b"not a png"), None);
    }
}
