//! Render orchestration for dr.
//!
//! [`RendererManager`] ties a [`RendererRegistry`](dr_renderer::RendererRegistry)
//! to a [`CacheStore`](dr_cache::CacheStore):
//!
//! 1. The cache is consulted first; a hit invokes no backend.
//! 2. On a miss, candidates are ordered by priority (a preferred renderer goes
//!    first) and tried one at a time, each under its own timeout.
//! 3. The first success is cached and returned. If every candidate fails, the
//!    caller gets one [`RenderError::AllFailed`](dr_renderer::RenderError)
//!    naming each backend and its error.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dr_cache::NullCache;
//! use dr_manager::{RenderParams, RendererManager};
//!
//! let manager = RendererManager::new(Arc::new(registry), Arc::new(NullCache::default()));
//! let outcome = manager.render(&RenderParams::new("graph TD; A-->B", "svg"))?;
//! ```

mod attempt;
mod manager;
mod metrics;
mod params;
mod preload;

pub use manager::{CACHE_RENDERER_NAME, RendererManager};
pub use metrics::MetricsSnapshot;
pub use params::{DEFAULT_CACHE_TTL, DEFAULT_TIMEOUT, ManagerSettings, RenderParams};
pub use preload::{PreloadConfig, PreloadSummary};
