//! Renderer contract and registry for dr.
//!
//! This crate defines what a diagram rendering backend is and how backends
//! are catalogued:
//!
//! - [`Renderer`]: the trait every backend implements (metadata, render,
//!   liveness probe, cleanup)
//! - [`RendererInfo`] / [`Capability`]: static backend metadata used for selection
//! - [`RenderOutcome`] / [`RenderContent`]: per-attempt results; ordinary
//!   failures are values, not errors
//! - [`RenderContext`] / [`CancelToken`]: per-attempt deadline and cancellation
//! - [`RendererRegistry`] / [`RendererFactory`]: name-to-factory catalog with
//!   filtered, priority-ordered enumeration
//! - [`RenderError`] / [`RegistryError`]: the error taxonomy
//!
//! A [`MockRenderer`] is available behind the `mock` feature for tests.
//!
//! # Example
//!
//! ```ignore
//! use dr_renderer::{RendererFilter, RendererRegistry};
//!
//! let registry = RendererRegistry::new();
//! // ... register backends ...
//! let candidates = registry.list_renderers(&RendererFilter::new().format("svg").available_only(true));
//! ```

mod context;
mod error;
mod info;
#[cfg(feature = "mock")]
mod mock;
mod outcome;
mod registry;
mod renderer;

pub use context::{CancelToken, RenderContext};
pub use error::{AttemptFailure, FailureKind, RegistryError, RenderError};
pub use info::{Capability, RendererInfo, normalize_format};
#[cfg(feature = "mock")]
pub use mock::{MockBehavior, MockFactory, MockRenderer};
pub use outcome::{RenderContent, RenderOutcome, is_text_format};
pub use registry::{FnFactory, RendererFactory, RendererFilter, RendererRegistry, factory_fn};
pub use renderer::{RenderOptions, RenderRequest, Renderer, RendererConfig};
