//! Mock renderer implementation for testing.
//!
//! Provides [`MockRenderer`], a scripted backend that counts its invocations,
//! and [`MockFactory`] for registering it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::context::RenderContext;
use crate::error::{FailureKind, RegistryError};
use crate::info::RendererInfo;
use crate::outcome::{RenderContent, RenderOutcome};
use crate::registry::RendererFactory;
use crate::renderer::{RenderRequest, Renderer, RendererConfig};

/// What a [`MockRenderer`] does when asked to render.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the given content.
    Succeed(RenderContent),
    /// Return a failed outcome with the given kind and message.
    Fail(FailureKind, String),
    /// Wait for `delay` (polling the context), then return `content`.
    Slow {
        delay: Duration,
        content: RenderContent,
    },
    /// Block for `delay` ignoring the context, then return `content`.
    Uninterruptible {
        delay: Duration,
        content: RenderContent,
    },
    /// Panic inside `render`.
    Panic,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    renders: AtomicUsize,
    interrupted: AtomicUsize,
    cleanups: AtomicUsize,
}

/// Scripted renderer for tests.
///
/// Clones share counters, so a test can keep one handle while the registry
/// creates instances from a [`MockFactory`].
///
/// # Example
///
/// ```ignore
/// use dr_renderer::{MockRenderer, RendererRegistry};
///
/// let fast = MockRenderer::new("svg-fast", 1, &["svg"]).failing("boom");
/// let mut registry = RendererRegistry::new();
/// registry.register("svg-fast", fast.factory(), false).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MockRenderer {
    info: RendererInfo,
    behavior: MockBehavior,
    available: bool,
    counters: Arc<Counters>,
}

impl MockRenderer {
    /// Create a mock that succeeds with `<svg/>`.
    #[must_use]
    pub fn new(name: &str, priority: i32, formats: &[&str]) -> Self {
        Self {
            info: RendererInfo::new(name)
                .with_formats(formats)
                .with_priority(priority),
            behavior: MockBehavior::Succeed(RenderContent::Text("<svg/>".to_owned())),
            available: true,
            counters: Arc::new(Counters::default()),
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: RendererInfo) -> Self {
        self.info = info;
        self
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    #[must_use]
    pub fn succeeding(self, content: &str) -> Self {
        self.with_behavior(MockBehavior::Succeed(RenderContent::Text(content.to_owned())))
    }

    #[must_use]
    pub fn failing(self, message: &str) -> Self {
        self.with_behavior(MockBehavior::Fail(FailureKind::Rendering, message.to_owned()))
    }

    #[must_use]
    pub fn slow(self, delay: Duration, content: &str) -> Self {
        self.with_behavior(MockBehavior::Slow {
            delay,
            content: RenderContent::Text(content.to_owned()),
        })
    }

    #[must_use]
    pub fn uninterruptible(self, delay: Duration, content: &str) -> Self {
        self.with_behavior(MockBehavior::Uninterruptible {
            delay,
            content: RenderContent::Text(content.to_owned()),
        })
    }

    #[must_use]
    pub fn panicking(self) -> Self {
        self.with_behavior(MockBehavior::Panic)
    }

    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Factory producing clones of this mock.
    #[must_use]
    pub fn factory(&self) -> MockFactory {
        MockFactory {
            template: self.clone(),
        }
    }

    /// Number of `render` calls across all clones.
    #[must_use]
    pub fn render_calls(&self) -> usize {
        self.counters.renders.load(Ordering::SeqCst)
    }

    /// Number of slow renders that stopped early because of the context.
    #[must_use]
    pub fn interrupted_calls(&self) -> usize {
        self.counters.interrupted.load(Ordering::SeqCst)
    }

    /// Number of `cleanup` calls across all clones.
    #[must_use]
    pub fn cleanup_calls(&self) -> usize {
        self.counters.cleanups.load(Ordering::SeqCst)
    }

    /// Number of instances created through the factory.
    #[must_use]
    pub fn instances_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }
}

impl Renderer for MockRenderer {
    fn info(&self) -> &RendererInfo {
        &self.info
    }

    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome {
        self.counters.renders.fetch_add(1, Ordering::SeqCst);
        let name = self.info.name.as_str();

        if !self.supports_format(request.format) {
            return RenderOutcome::failure(
                name,
                request.format,
                FailureKind::UnsupportedFormat,
                format!("format '{}' not supported", request.format),
            );
        }

        match &self.behavior {
            MockBehavior::Succeed(content) => {
                RenderOutcome::success(name, request.format, content.clone())
            }
            MockBehavior::Fail(kind, message) => {
                RenderOutcome::failure(name, request.format, *kind, message.clone())
            }
            MockBehavior::Slow { delay, content } => {
                let until = Instant::now() + *delay;
                while Instant::now() < until {
                    if let Some(kind) = ctx.interruption() {
                        self.counters.interrupted.fetch_add(1, Ordering::SeqCst);
                        return RenderOutcome::failure(name, request.format, kind, "interrupted");
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                RenderOutcome::success(name, request.format, content.clone())
            }
            MockBehavior::Uninterruptible { delay, content } => {
                std::thread::sleep(*delay);
                RenderOutcome::success(name, request.format, content.clone())
            }
            MockBehavior::Panic => panic!("mock renderer '{name}' panicked"),
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn cleanup(&self) {
        self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// [`RendererFactory`] for [`MockRenderer`].
#[derive(Debug)]
pub struct MockFactory {
    template: MockRenderer,
}

impl RendererFactory for MockFactory {
    fn info(&self) -> RendererInfo {
        self.template.info.clone()
    }

    fn create(&self, _config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        self.template.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.template.clone()))
    }
}
