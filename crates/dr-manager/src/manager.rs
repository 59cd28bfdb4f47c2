//! Renderer selection, fallback and caching.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use dr_cache::{CacheEntry, CacheKey, CacheStats, CacheStore, ContentKind, canonical_options};
use dr_renderer::{
    AttemptFailure, CancelToken, FailureKind, RegistryError, RenderContent, RenderContext,
    RenderError, RenderOutcome, RenderRequest, Renderer, RendererConfig, RendererFilter,
    RendererInfo, RendererRegistry, normalize_format,
};

use crate::attempt::run_attempt;
use crate::metrics::{MetricsSnapshot, PerformanceMetrics};
use crate::params::{AttemptJob, ManagerSettings, RenderParams};

/// Name reported by outcomes served from the cache.
pub const CACHE_RENDERER_NAME: &str = "cache";

/// Pooled instances keyed by renderer name and canonical config.
type InstancePool = HashMap<(String, String), Arc<PooledRenderer>>;

/// Pool handle that cleans its backend up when the last holder drops it.
///
/// Attempt workers hold a clone, so a worker abandoned after a timeout keeps
/// its instance's resources alive until it returns.
struct PooledRenderer(Arc<dyn Renderer>);

impl Renderer for PooledRenderer {
    fn info(&self) -> &RendererInfo {
        self.0.info()
    }

    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome {
        self.0.render(request, ctx)
    }

    fn supports_format(&self, format: &str) -> bool {
        self.0.supports_format(format)
    }

    fn is_available(&self) -> bool {
        self.0.is_available()
    }

    // Released in Drop only.
    fn cleanup(&self) {}
}

impl Drop for PooledRenderer {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

/// Orchestrates renders across the backends of a [`RendererRegistry`].
///
/// Consults the cache first, then tries candidate backends one at a time in
/// priority order until one succeeds. Backend instances created during the
/// manager's lifetime are reused and released by [`cleanup`](Self::cleanup),
/// which also runs on drop.
///
/// The manager is `Sync`; one instance serves concurrent requests.
pub struct RendererManager {
    registry: Arc<RendererRegistry>,
    cache: Arc<dyn CacheStore>,
    settings: ManagerSettings,
    instances: Mutex<InstancePool>,
    metrics: Mutex<PerformanceMetrics>,
}

impl std::fmt::Debug for RendererManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererManager")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RendererManager {
    /// Create a manager with default settings.
    #[must_use]
    pub fn new(registry: Arc<RendererRegistry>, cache: Arc<dyn CacheStore>) -> Self {
        Self::with_settings(registry, cache, ManagerSettings::default())
    }

    #[must_use]
    pub fn with_settings(
        registry: Arc<RendererRegistry>,
        cache: Arc<dyn CacheStore>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            settings,
            instances: Mutex::new(HashMap::new()),
            metrics: Mutex::new(PerformanceMetrics::default()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Render `params.source` to `params.format`.
    ///
    /// Returns a successful outcome, either from the cache (renderer name
    /// [`CACHE_RENDERER_NAME`], metadata `cached = true`) or from the first
    /// candidate backend that succeeds.
    ///
    /// # Errors
    ///
    /// - [`RenderError::UnsupportedFormat`] if no registered backend declares
    ///   the format. No backend is invoked.
    /// - [`RenderError::Cancelled`] if the caller's token is cancelled.
    /// - [`RenderError::AllFailed`] if every candidate failed, listing each
    ///   candidate and its error in attempt order.
    pub fn render(&self, params: &RenderParams) -> Result<RenderOutcome, RenderError> {
        let format = normalize_format(&params.format);
        self.metrics_guard().record_request();

        if params.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(RenderError::Cancelled);
        }

        let key = CacheKey {
            source: &params.source,
            format: &format,
            theme: params.theme.as_deref(),
            options: Some(&params.options),
        }
        .compute_hash();

        match self.cache.get(&key) {
            Some(entry) if entry.content.is_empty() => {
                tracing::debug!(key = %key, format = %format, "Discarding empty cache entry");
                self.cache.remove(&key);
            }
            Some(entry) => {
                tracing::debug!(key = %key, format = %format, "Cache hit");
                self.metrics_guard().record_cache_hit();
                return Ok(cached_outcome(&key, entry));
            }
            None => {}
        }
        tracing::debug!(key = %key, format = %format, "Cache miss");
        self.metrics_guard().record_cache_miss();

        let candidates = self.candidates(params, &format)?;
        let timeout = params.timeout.unwrap_or(self.settings.timeout);
        let mut failures = Vec::with_capacity(candidates.len());

        for name in candidates {
            if params.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(RenderError::Cancelled);
            }

            let started = Instant::now();
            let outcome = match self.prepare(&name, &format, &params.config) {
                Ok(instance) => {
                    tracing::debug!(renderer = %name, format = %format, "Render attempt");
                    let token = params
                        .cancel
                        .as_ref()
                        .map_or_else(CancelToken::new, CancelToken::child);
                    let ctx = RenderContext::new()
                        .with_timeout(timeout)
                        .with_cancel_token(token);
                    run_attempt(instance, AttemptJob::new(params, &format), &ctx)
                }
                Err(failure) => failure,
            };
            let elapsed = started.elapsed();

            if outcome.is_success() {
                let mut outcome = outcome;
                outcome.set_render_time(elapsed);
                self.store(&key, &format, &outcome);
                self.metrics_guard().record_success(&name, elapsed);
                tracing::info!(
                    renderer = %name,
                    format = %format,
                    elapsed_ms = elapsed.as_millis(),
                    "Rendered diagram"
                );
                return Ok(outcome);
            }

            let kind = outcome.failure_kind().unwrap_or(FailureKind::Rendering);
            let message = outcome.error().unwrap_or("unknown error").to_owned();
            self.metrics_guard().record_failure(&name);
            tracing::warn!(renderer = %name, kind = %kind, error = %message, "Render attempt failed");

            if params.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(RenderError::Cancelled);
            }
            failures.push(AttemptFailure {
                renderer: name,
                kind,
                message,
            });
        }

        Err(RenderError::AllFailed { attempts: failures })
    }

    /// Union of formats across registered, available renderers.
    #[must_use]
    pub fn available_formats(&self) -> BTreeSet<String> {
        self.registry
            .list_renderers(&RendererFilter::new().available_only(true))
            .iter()
            .filter_map(|name| self.registry.info(name))
            .flat_map(|info| info.supported_formats)
            .collect()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Remove every cache entry. Returns the number removed.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!(removed, "Cleared render cache");
        removed
    }

    /// Remove expired cache entries. Returns the number removed.
    pub fn cleanup_expired_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics_guard().snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics_guard().reset();
    }

    /// Release every backend instance created so far.
    ///
    /// Each instance is cleaned up exactly once; calling this again is a
    /// no-op until new instances are created by later renders. An instance
    /// still used by an abandoned attempt is cleaned up when that attempt
    /// returns.
    pub fn cleanup(&self) {
        let instances: Vec<_> = self.pool().drain().map(|(_, instance)| instance).collect();
        if instances.is_empty() {
            return;
        }
        let busy = instances
            .iter()
            .filter(|instance| Arc::strong_count(instance) > 1)
            .count();
        tracing::debug!(
            count = instances.len(),
            busy,
            "Cleaning up renderer instances"
        );
        drop(instances);
    }

    pub(crate) fn default_format(&self) -> &str {
        &self.settings.default_format
    }

    /// Ordered candidate list for `format`.
    fn candidates(&self, params: &RenderParams, format: &str) -> Result<Vec<String>, RenderError> {
        let declared = self
            .registry
            .list_renderers(&RendererFilter::new().format(format));
        if declared.is_empty() {
            return Err(RenderError::UnsupportedFormat {
                format: format.to_owned(),
            });
        }

        let mut candidates = Vec::with_capacity(declared.len());
        if let Some(preferred) = &params.preferred_renderer {
            if declared.contains(preferred) && self.registry.is_available(preferred) {
                candidates.push(preferred.clone());
            } else {
                tracing::debug!(renderer = %preferred, format = %format, "Preferred renderer not usable");
            }
        }
        for name in self
            .registry
            .list_renderers(&RendererFilter::new().format(format).available_only(true))
        {
            if !candidates.contains(&name) {
                candidates.push(name);
            }
        }
        if !params.fallback {
            candidates.truncate(1);
        }

        if candidates.is_empty() {
            let attempts = declared
                .into_iter()
                .map(|renderer| AttemptFailure {
                    renderer,
                    kind: FailureKind::NotAvailable,
                    message: FailureKind::NotAvailable.to_string(),
                })
                .collect();
            return Err(RenderError::AllFailed { attempts });
        }
        Ok(candidates)
    }

    /// Pooled instance of `name`, re-checked for availability.
    ///
    /// Returns the failed outcome to record when the instance cannot be used.
    fn prepare(
        &self,
        name: &str,
        format: &str,
        config: &RendererConfig,
    ) -> Result<Arc<dyn Renderer>, RenderOutcome> {
        let instance = self.instance(name, config).map_err(|e| {
            let kind = match e {
                RegistryError::Configuration { .. } => FailureKind::Configuration,
                RegistryError::NotFound(_) | RegistryError::Duplicate(_) => {
                    FailureKind::NotAvailable
                }
            };
            RenderOutcome::failure(name, format, kind, e.to_string())
        })?;

        if !instance.is_available() {
            return Err(RenderOutcome::failure(
                name,
                format,
                FailureKind::NotAvailable,
                FailureKind::NotAvailable.to_string(),
            ));
        }
        Ok(instance)
    }

    fn instance(
        &self,
        name: &str,
        config: &RendererConfig,
    ) -> Result<Arc<dyn Renderer>, RegistryError> {
        let pool_key = (name.to_owned(), canonical_options(config));
        let pooled = self.pool().get(&pool_key).map(Arc::clone);
        if let Some(instance) = pooled {
            return Ok(instance);
        }

        // Created outside the lock; a concurrent creator may win the insert,
        // in which case dropping ours cleans it up.
        let created = Arc::new(PooledRenderer(self.registry.create_renderer(name, config)?));
        let instance = Arc::clone(
            self.pool()
                .entry(pool_key)
                .or_insert_with(|| Arc::clone(&created)),
        );
        drop(created);
        Ok(instance)
    }

    fn store(&self, key: &str, format: &str, outcome: &RenderOutcome) {
        let Some(content) = outcome.content() else {
            return;
        };
        let kind = if content.is_text() {
            ContentKind::Text
        } else {
            ContentKind::Binary
        };
        let entry = CacheEntry::new(
            key,
            format,
            kind,
            content.as_bytes().to_vec(),
            self.settings.cache_ttl,
        );
        self.cache.put(&entry);
    }

    fn pool(&self) -> MutexGuard<'_, InstancePool> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_guard(&self) -> MutexGuard<'_, PerformanceMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RendererManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn cached_outcome(key: &str, entry: CacheEntry) -> RenderOutcome {
    let format = entry.format.clone();
    let content = match entry.kind {
        ContentKind::Text => match String::from_utf8(entry.content) {
            Ok(text) => RenderContent::Text(text),
            Err(e) => RenderContent::Binary(e.into_bytes()),
        },
        ContentKind::Binary => RenderContent::Binary(entry.content),
    };
    RenderOutcome::success(CACHE_RENDERER_NAME, format, content)
        .with_metadata("cached", true)
        .with_metadata("cache_key", key)
}
