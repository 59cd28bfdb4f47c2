//! Warming the cache from a batch of render requests.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use dr_renderer::RenderOptions;

use crate::manager::RendererManager;
use crate::params::RenderParams;

/// One diagram to render ahead of time.
///
/// Deserializable so a batch can be read from a JSON file:
///
/// ```json
/// [{ "source": "graph TD; A-->B", "theme": "dark", "options": { "width": 800 } }]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreloadConfig {
    pub source: String,
    /// Output format; the manager's default format when absent.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub options: RenderOptions,
}

impl PreloadConfig {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// Aggregate result of a preload batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadSummary {
    pub successful: usize,
    pub failed: usize,
}

impl RendererManager {
    /// Render every config and populate the cache.
    ///
    /// Configs are rendered in parallel on the rayon pool. A failing config is
    /// counted and logged; it never aborts the batch.
    pub fn preload_cache(&self, configs: &[PreloadConfig]) -> PreloadSummary {
        let successful = configs
            .par_iter()
            .filter(|config| {
                let format = config.format.as_deref().unwrap_or(self.default_format());
                let mut params = RenderParams::new(config.source.clone(), format)
                    .options(config.options.clone());
                params.theme.clone_from(&config.theme);

                match self.render(&params) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(format = %format, error = %e, "Preload failed");
                        false
                    }
                }
            })
            .count();

        let summary = PreloadSummary {
            successful,
            failed: configs.len() - successful,
        };
        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            "Preloaded render cache"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dr_cache::FileCache;
    use dr_renderer::{MockRenderer, RendererRegistry};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_preload_counts_successes_and_failures() {
        let dir = TempDir::new().unwrap();
        let svg = MockRenderer::new("svg", 1, &["svg"]);
        let mut registry = RendererRegistry::new();
        registry.register("svg", svg.factory(), false).unwrap();
        let manager = RendererManager::new(
            Arc::new(registry),
            Arc::new(FileCache::new(dir.path().join("cache"), "test")),
        );

        let mut pdf = PreloadConfig::new("graph C");
        pdf.format = Some("pdf".to_owned());
        let configs = vec![PreloadConfig::new("graph A"), PreloadConfig::new("graph B"), pdf];

        let summary = manager.preload_cache(&configs);
        assert_eq!(summary, PreloadSummary { successful: 2, failed: 1 });
        assert_eq!(manager.cache_stats().total_files, 2);

        // Preloaded entries are served from the cache
        manager.render(&RenderParams::new("graph A", "svg")).unwrap();
        assert_eq!(svg.render_calls(), 2);
    }

    #[test]
    fn test_preload_config_from_json() {
        let configs: Vec<PreloadConfig> = serde_json::from_str(
            r#"[{"source": "a"}, {"source": "b", "format": "png", "theme": "dark", "options": {"w": 1}}]"#,
        )
        .unwrap();

        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].format, None);
        assert_eq!(configs[1].format.as_deref(), Some("png"));
        assert_eq!(configs[1].theme.as_deref(), Some("dark"));
        assert_eq!(configs[1].options.get("w"), Some(&serde_json::json!(1)));
    }
}
