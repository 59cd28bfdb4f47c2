//! Built-in rendering backends for dr.
//!
//! Each backend implements [`Renderer`](dr_renderer::Renderer) and ships a
//! [`RendererFactory`](dr_renderer::RendererFactory):
//!
//! | Name | Tool | Formats |
//! |---|---|---|
//! | `mermaid-cli` | `mmdc` subprocess | svg, png, pdf |
//! | `graphviz` | `dot` subprocess | svg, png, pdf |
//! | `d2` | `d2` subprocess | svg, png, pdf |
//! | `kroki` | Kroki HTTP service | svg, png, pdf, jpeg |
//!
//! Subprocesses are killed when the attempt's deadline passes or its token is
//! cancelled. Command-line backends are available when their executable can
//! be found; Kroki is available when a server URL is configured.
//!
//! # Example
//!
//! ```
//! use dr_backends::{BuiltinSettings, register_builtin};
//! use dr_renderer::RendererRegistry;
//!
//! let mut registry = RendererRegistry::new();
//! register_builtin(&mut registry, &BuiltinSettings::default()).unwrap();
//! assert!(registry.contains("graphviz"));
//! ```

mod command;
mod d2;
mod graphviz;
mod kroki;
mod mermaid_cli;
mod process;
mod scratch;
#[cfg(all(test, unix))]
mod testing;

use dr_renderer::{RegistryError, RendererRegistry};

pub use command::CommandSettings;
pub use d2::{D2Factory, D2Renderer, D2Settings};
pub use graphviz::{GraphvizFactory, GraphvizRenderer, GraphvizSettings};
pub use kroki::{DEFAULT_DIAGRAM_TYPE, KrokiFactory, KrokiRenderer, KrokiSettings};
pub use mermaid_cli::{MermaidCliFactory, MermaidCliRenderer, MermaidCliSettings};
pub use process::{ProcessCommand, ProcessError, ProcessOutput};

/// Registry names of the built-in backends.
pub mod names {
    pub use crate::d2::NAME as D2;
    pub use crate::graphviz::NAME as GRAPHVIZ;
    pub use crate::kroki::NAME as KROKI;
    pub use crate::mermaid_cli::NAME as MERMAID_CLI;
}

/// Settings for every built-in backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinSettings {
    pub kroki: KrokiSettings,
    pub mermaid_cli: MermaidCliSettings,
    pub graphviz: GraphvizSettings,
    pub d2: D2Settings,
}

/// Register every built-in backend in `registry`.
///
/// Fails with [`RegistryError::Duplicate`] if a built-in name is taken.
pub fn register_builtin(
    registry: &mut RendererRegistry,
    settings: &BuiltinSettings,
) -> Result<(), RegistryError> {
    registry.register(
        names::MERMAID_CLI,
        MermaidCliFactory::new(settings.mermaid_cli.clone()),
        false,
    )?;
    registry.register(
        names::GRAPHVIZ,
        GraphvizFactory::new(settings.graphviz.clone()),
        false,
    )?;
    registry.register(names::D2, D2Factory::new(settings.d2.clone()), false)?;
    registry.register(names::KROKI, KrokiFactory::new(settings.kroki.clone()), false)?;
    Ok(())
}
