//! Static renderer metadata.
//!
//! [`RendererInfo`] is what a backend reports about itself: its name, the
//! formats it can produce, the capability tags used for filtering, and its
//! selection priority.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Declared feature of a renderer, used for filtering during selection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Renderer manages its own result caching.
    CachingAware,
    /// Renderer honours the `theme` parameter.
    ThemeSupport,
    /// Rendering happens on the local machine (subprocess, library).
    LocalRendering,
    /// Rendering happens on a remote service.
    RemoteRendering,
    /// Renderer can process several diagrams per invocation.
    BatchProcessing,
    /// Any other tag a backend wants to advertise.
    Other(String),
}

impl Capability {
    /// Tag string as written in configuration and CLI filters.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CachingAware => "caching-aware",
            Self::ThemeSupport => "theme-support",
            Self::LocalRendering => "local-rendering",
            Self::RemoteRendering => "remote-rendering",
            Self::BatchProcessing => "batch-processing",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(match tag.as_str() {
            "caching-aware" => Self::CachingAware,
            "theme-support" => Self::ThemeSupport,
            "local-rendering" => Self::LocalRendering,
            "remote-rendering" => Self::RemoteRendering,
            "batch-processing" => Self::BatchProcessing,
            _ => Self::Other(tag),
        })
    }
}

/// Normalize a format token (`"SVG"`, `" svg "` -> `"svg"`).
#[must_use]
pub fn normalize_format(format: &str) -> String {
    format.trim().to_ascii_lowercase()
}

/// Static metadata a renderer reports about itself.
///
/// Built with [`RendererInfo::new`] and the `with_*` methods:
///
/// ```
/// use dr_renderer::{Capability, RendererInfo};
///
/// let info = RendererInfo::new("graphviz")
///     .with_description("Graphviz dot")
///     .with_formats(["svg", "PNG"])
///     .with_capability(Capability::LocalRendering)
///     .with_priority(20);
///
/// assert!(info.supports_format("png"));
/// assert!(info.has_capability(&Capability::LocalRendering));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RendererInfo {
    /// Unique renderer name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Output formats this renderer can produce (lowercase).
    pub supported_formats: BTreeSet<String>,
    /// Capability tags.
    pub capabilities: BTreeSet<Capability>,
    /// Selection priority; lower is preferred.
    pub priority: i32,
    /// Renderer version string.
    pub version: String,
    /// External dependencies (informational only).
    pub dependencies: Vec<String>,
}

impl RendererInfo {
    /// Create metadata with the given name and neutral defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            supported_formats: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            priority: 100,
            version: "0.0.0".to_owned(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add supported formats. Tokens are normalized to lowercase.
    #[must_use]
    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_formats
            .extend(formats.into_iter().map(|f| normalize_format(f.as_ref())));
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Whether `format` is among the supported formats (case-insensitive).
    #[must_use]
    pub fn supports_format(&self, format: &str) -> bool {
        self.supported_formats.contains(&normalize_format(format))
    }

    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}
