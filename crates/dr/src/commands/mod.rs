//! CLI command implementations.

pub(crate) mod cache;
pub(crate) mod formats;
pub(crate) mod render;
pub(crate) mod renderers;

pub(crate) use cache::CacheCommand;
pub(crate) use formats::FormatsArgs;
pub(crate) use render::RenderArgs;
pub(crate) use renderers::RenderersArgs;
