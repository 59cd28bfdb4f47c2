//! Renderer registry.
//!
//! [`RendererRegistry`] maps renderer names to [`RendererFactory`]s. It is an
//! explicit object handed to the manager; the application decides how many
//! registries exist. Mutation requires `&mut self`, so once a registry is
//! shared behind an `Arc` its contents are fixed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::info::{Capability, RendererInfo};
use crate::renderer::{Renderer, RendererConfig};

/// Produces renderer instances.
pub trait RendererFactory: Send + Sync {
    /// Descriptor of the renderers this factory creates.
    fn info(&self) -> RendererInfo;

    /// Create an instance with the given configuration overrides.
    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError>;
}

/// [`RendererFactory`] built from a descriptor and a closure.
pub struct FnFactory<F> {
    info: RendererInfo,
    create: F,
}

impl<F> RendererFactory for FnFactory<F>
where
    F: Fn(&RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> + Send + Sync,
{
    fn info(&self) -> RendererInfo {
        self.info.clone()
    }

    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        (self.create)(config)
    }
}

/// Wrap a closure as a [`RendererFactory`].
///
/// ```
/// use std::sync::Arc;
/// use dr_renderer::{RendererInfo, RendererRegistry, factory_fn};
/// # use dr_renderer::{RenderContext, RenderOutcome, RenderRequest, Renderer};
/// # struct Noop(RendererInfo);
/// # impl Renderer for Noop {
/// #     fn info(&self) -> &RendererInfo { &self.0 }
/// #     fn render(&self, r: &RenderRequest<'_>, _: &RenderContext) -> RenderOutcome {
/// #         RenderOutcome::failure("noop", r.format, dr_renderer::FailureKind::Rendering, "noop")
/// #     }
/// # }
///
/// let info = RendererInfo::new("noop").with_formats(["svg"]);
/// let mut registry = RendererRegistry::new();
/// registry
///     .register("noop", factory_fn(info.clone(), move |_| Ok(Arc::new(Noop(info.clone())))), false)
///     .unwrap();
/// assert_eq!(registry.get_best_renderer("svg").as_deref(), Some("noop"));
/// ```
pub fn factory_fn<F>(info: RendererInfo, create: F) -> FnFactory<F>
where
    F: Fn(&RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> + Send + Sync,
{
    FnFactory { info, create }
}

/// Filters for [`RendererRegistry::list_renderers`]. All supplied filters must match.
#[derive(Debug, Clone, Default)]
pub struct RendererFilter {
    pub format: Option<String>,
    pub capability: Option<Capability>,
    /// Probe each renderer with a transient instance and keep only live ones.
    pub available_only: bool,
}

impl RendererFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    #[must_use]
    pub fn available_only(mut self, available_only: bool) -> Self {
        self.available_only = available_only;
        self
    }
}

/// Catalog of installed renderers.
#[derive(Default)]
pub struct RendererRegistry {
    entries: BTreeMap<String, Box<dyn RendererFactory>>,
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("renderers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RendererRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`.
    ///
    /// Fails with [`RegistryError::Duplicate`] if `name` is taken and
    /// `override_existing` is false; otherwise inserts or replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl RendererFactory + 'static,
        override_existing: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            if !override_existing {
                return Err(RegistryError::Duplicate(name));
            }
            tracing::debug!(renderer = %name, "Overriding registered renderer");
        } else {
            tracing::debug!(renderer = %name, "Registered renderer");
        }
        self.entries.insert(name, Box::new(factory));
        Ok(())
    }

    /// Remove `name`. Returns whether an entry was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            tracing::debug!(renderer = %name, "Unregistered renderer");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor of a registered renderer.
    #[must_use]
    pub fn info(&self, name: &str) -> Option<RendererInfo> {
        self.entries.get(name).map(|factory| factory.info())
    }

    /// Names matching `filter`, ordered by ascending priority then name.
    #[must_use]
    pub fn list_renderers(&self, filter: &RendererFilter) -> Vec<String> {
        let mut matches: Vec<(i32, &String)> = self
            .entries
            .iter()
            .filter_map(|(name, factory)| {
                let info = factory.info();
                if let Some(format) = &filter.format
                    && !info.supports_format(format)
                {
                    return None;
                }
                if let Some(capability) = &filter.capability
                    && !info.has_capability(capability)
                {
                    return None;
                }
                if filter.available_only && !probe_available(name, factory.as_ref()) {
                    return None;
                }
                Some((info.priority, name))
            })
            .collect();

        // BTreeMap iteration already yields names in order; the sort is stable.
        matches.sort_by_key(|(priority, _)| *priority);
        matches.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Probe `name` with a transient instance. Unknown names are unavailable.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|factory| probe_available(name, factory.as_ref()))
    }

    /// Best available renderer for `format`.
    #[must_use]
    pub fn get_best_renderer(&self, format: &str) -> Option<String> {
        self.list_renderers(&RendererFilter::new().format(format).available_only(true))
            .into_iter()
            .next()
    }

    /// Instantiate `name` with `config`.
    pub fn create_renderer(
        &self,
        name: &str,
        config: &RendererConfig,
    ) -> Result<Arc<dyn Renderer>, RegistryError> {
        let factory = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        factory.create(config)
    }
}

/// Liveness check on a transient instance, cleaned up afterwards.
fn probe_available(name: &str, factory: &dyn RendererFactory) -> bool {
    match factory.create(&RendererConfig::new()) {
        Ok(instance) => {
            let available = instance.is_available();
            instance.cleanup();
            if !available {
                tracing::debug!(renderer = %name, "Renderer not available");
            }
            available
        }
        Err(e) => {
            tracing::debug!(renderer = %name, error = %e, "Failed to create renderer for probe");
            false
        }
    }
}
