//! The renderer contract every backend implements.

use serde_json::{Map, Value};

use crate::context::RenderContext;
use crate::info::{Capability, RendererInfo};
use crate::outcome::RenderOutcome;

/// Free-form render options (e.g. `{"width": 800, "background": "white"}`).
pub type RenderOptions = Map<String, Value>;

/// Backend configuration handed to factories and render calls.
pub type RendererConfig = Map<String, Value>;

/// Input of a single render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// Diagram source text, passed through unmodified.
    pub source: &'a str,
    /// Requested output format (lowercase).
    pub format: &'a str,
    /// Optional theme name.
    pub theme: Option<&'a str>,
    /// Per-call backend configuration.
    pub config: &'a RendererConfig,
    /// Render options.
    pub options: &'a RenderOptions,
}

impl<'a> RenderRequest<'a> {
    /// Look up a string option.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&'a str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Look up an unsigned integer option.
    #[must_use]
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

/// A pluggable diagram rendering backend.
///
/// Implementations must be thread-safe: the manager shares instances across
/// worker threads and may run an attempt on a different thread than the one
/// that created the instance.
///
/// # Failure semantics
///
/// [`Renderer::render`] returns ordinary failures (bad input, missing tool,
/// timeout, network error) as a failed [`RenderOutcome`]. Panicking is
/// reserved for broken internal invariants.
pub trait Renderer: Send + Sync {
    /// Static metadata. Must be cheap and side-effect free.
    fn info(&self) -> &RendererInfo;

    /// Render `request` to content, honouring the deadline and cancellation in `ctx`.
    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome;

    /// Whether this renderer can produce `format`.
    fn supports_format(&self, format: &str) -> bool {
        self.info().supports_format(format)
    }

    fn has_capability(&self, capability: &Capability) -> bool {
        self.info().has_capability(capability)
    }

    /// Liveness probe, cheap enough to call before every attempt.
    fn is_available(&self) -> bool {
        true
    }

    /// Release held resources. Must be idempotent.
    fn cleanup(&self) {}
}
