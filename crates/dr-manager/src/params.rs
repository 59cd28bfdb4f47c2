//! Render request parameters and manager settings.

use std::time::Duration;

use dr_renderer::{CancelToken, RenderOptions, RenderRequest, RendererConfig};
use serde_json::Value;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cache entry lifetime (24 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Manager-wide settings.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Per-attempt timeout applied when a request does not set one.
    pub timeout: Duration,
    /// Lifetime of cache entries written by the manager.
    pub cache_ttl: Duration,
    /// Format used by preload configs that do not name one.
    pub default_format: String,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            default_format: "svg".to_owned(),
        }
    }
}

/// Parameters of one [`RendererManager::render`](crate::RendererManager::render) call.
///
/// ```
/// use dr_manager::RenderParams;
///
/// let params = RenderParams::new("graph TD; A-->B", "svg")
///     .theme("dark")
///     .option("width", 800)
///     .preferred_renderer("mermaid-cli")
///     .fallback(false);
/// assert_eq!(params.format, "svg");
/// ```
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Diagram source text, passed to backends unmodified.
    pub source: String,
    pub format: String,
    pub theme: Option<String>,
    /// Backend configuration overrides.
    pub config: RendererConfig,
    /// Renderer to try first, if registered, available, and capable.
    pub preferred_renderer: Option<String>,
    /// Try further candidates after a failure (default `true`).
    pub fallback: bool,
    pub options: RenderOptions,
    /// Caller cancellation; propagated to the running attempt.
    pub cancel: Option<CancelToken>,
    /// Per-attempt timeout overriding [`ManagerSettings::timeout`].
    pub timeout: Option<Duration>,
}

impl RenderParams {
    #[must_use]
    pub fn new(source: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: format.into(),
            theme: None,
            config: RendererConfig::new(),
            preferred_renderer: None,
            fallback: true,
            options: RenderOptions::new(),
            cancel: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn preferred_renderer(mut self, name: impl Into<String>) -> Self {
        self.preferred_renderer = Some(name.into());
        self
    }

    #[must_use]
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    #[must_use]
    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Set a single option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Owned copy of the request data handed to a worker thread.
#[derive(Debug, Clone)]
pub(crate) struct AttemptJob {
    pub source: String,
    pub format: String,
    pub theme: Option<String>,
    pub config: RendererConfig,
    pub options: RenderOptions,
}

impl AttemptJob {
    pub fn new(params: &RenderParams, format: &str) -> Self {
        Self {
            source: params.source.clone(),
            format: format.to_owned(),
            theme: params.theme.clone(),
            config: params.config.clone(),
            options: params.options.clone(),
        }
    }

    pub fn request(&self) -> RenderRequest<'_> {
        RenderRequest {
            source: &self.source,
            format: &self.format,
            theme: self.theme.as_deref(),
            config: &self.config,
            options: &self.options,
        }
    }
}
