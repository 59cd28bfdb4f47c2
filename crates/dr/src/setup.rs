//! Building a [`RendererManager`] from loaded configuration.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use dr_backends::{
    BuiltinSettings, CommandSettings, D2Settings, GraphvizSettings, KrokiSettings,
    MermaidCliSettings, register_builtin,
};
use dr_cache::{CacheStore, FileCache, NullCache};
use dr_config::{CliSettings, Config};
use dr_manager::{ManagerSettings, RendererManager};
use dr_renderer::RendererRegistry;

use crate::VERSION;
use crate::error::CliError;

/// Configuration arguments shared by every command.
#[derive(Args, Debug, Default)]
pub(crate) struct ConfigArgs {
    /// Path to configuration file (default: auto-discover dr.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Kroki server URL (overrides config).
    #[arg(long, env = "DR_KROKI_URL")]
    kroki_url: Option<String>,

    /// Per-attempt render timeout in seconds (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable caching (default: enabled).
    #[arg(long)]
    cache: Option<bool>,

    /// Disable caching.
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,
}

impl ConfigArgs {
    /// Load configuration with CLI overrides applied.
    pub(crate) fn load(&self) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            cache_enabled: self.resolve_cache_enabled(),
            kroki_url: self.kroki_url.clone(),
            timeout_seconds: self.timeout,
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }

    /// Resolve `cache_enabled` from --cache/--no-cache flags.
    fn resolve_cache_enabled(&self) -> Option<bool> {
        self.no_cache.then_some(false).or(self.cache)
    }
}

/// Map configuration onto built-in backend settings.
pub(crate) fn builtin_settings(config: &Config) -> BuiltinSettings {
    BuiltinSettings {
        kroki: KrokiSettings {
            url: config.kroki_resolved.url.clone(),
            priority: config.kroki_resolved.priority,
        },
        mermaid_cli: MermaidCliSettings {
            command: CommandSettings::new(
                config.mermaid_cli.command.clone(),
                config.mermaid_cli.priority,
            ),
            puppeteer_config: config.mermaid_cli.puppeteer_config.clone(),
        },
        graphviz: GraphvizSettings(CommandSettings::new(
            config.graphviz.command.clone(),
            config.graphviz.priority,
        )),
        d2: D2Settings(CommandSettings::new(
            config.d2.command.clone(),
            config.d2.priority,
        )),
    }
}

/// Registry holding every built-in backend.
pub(crate) fn build_registry(config: &Config) -> Result<RendererRegistry, CliError> {
    let mut registry = RendererRegistry::new();
    register_builtin(&mut registry, &builtin_settings(config))?;
    Ok(registry)
}

/// Cache store selected by `cache.enabled`.
pub(crate) fn build_cache(config: &Config) -> Arc<dyn CacheStore> {
    if config.cache_resolved.enabled {
        tracing::debug!(dir = %config.cache_resolved.dir.display(), "Using file cache");
        Arc::new(FileCache::new(config.cache_resolved.dir.clone(), VERSION))
    } else {
        Arc::new(NullCache::default())
    }
}

/// Manager over the built-in registry and the configured cache.
pub(crate) fn build_manager(config: &Config) -> Result<RendererManager, CliError> {
    let registry = build_registry(config)?;
    let settings = ManagerSettings {
        timeout: config.render.timeout(),
        cache_ttl: config.cache_resolved.ttl(),
        default_format: config.render.default_format.clone(),
    };
    Ok(RendererManager::with_settings(
        Arc::new(registry),
        build_cache(config),
        settings,
    ))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;

    fn load(toml: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");
        std::fs::write(&path, toml).unwrap();
        let config = Config::load(Some(&path), None).unwrap();
        (dir, config)
    }

    #[test]
    fn test_builtin_settings_follow_config() {
        let (_dir, config) = load(
            r#"
[kroki]
url = "https://kroki.example.com"
priority = 1

[mermaid_cli]
command = "/opt/mmdc"
priority = 7
puppeteer_config = "/etc/puppeteer.json"

[graphviz]
command = "dot2"

[d2]
priority = 3
"#,
        );

        let settings = builtin_settings(&config);
        assert_eq!(
            settings.kroki.url.as_deref(),
            Some("https://kroki.example.com")
        );
        assert_eq!(settings.kroki.priority, 1);
        assert_eq!(settings.mermaid_cli.command, CommandSettings::new("/opt/mmdc", 7));
        assert_eq!(
            settings.mermaid_cli.puppeteer_config.as_deref(),
            Some(Path::new("/etc/puppeteer.json"))
        );
        assert_eq!(settings.graphviz.0, CommandSettings::new("dot2", 20));
        assert_eq!(settings.d2.0, CommandSettings::new("d2", 3));
    }

    #[test]
    fn test_build_registry_orders_by_config_priority() {
        let (_dir, config) = load("[mermaid_cli]\npriority = 50\n");

        let registry = build_registry(&config).unwrap();
        let names = registry.list_renderers(&dr_renderer::RendererFilter::new().format("svg"));
        assert_eq!(names.first().map(String::as_str), Some("d2"));
        assert_eq!(names.last().map(String::as_str), Some("mermaid-cli"));
    }

    #[test]
    fn test_build_manager_uses_render_settings() {
        let (_dir, config) = load(
            "[render]\ntimeout_seconds = 5\ndefault_format = \"png\"\n[cache]\nenabled = false\n",
        );

        let manager = build_manager(&config).unwrap();
        assert_eq!(manager.settings().timeout.as_secs(), 5);
        assert_eq!(manager.settings().default_format, "png");
        assert_eq!(manager.cache_stats().total_files, 0);
    }

    #[test]
    fn test_no_cache_flag_wins() {
        let args = ConfigArgs {
            no_cache: true,
            cache: None,
            ..ConfigArgs::default()
        };
        assert_eq!(args.resolve_cache_enabled(), Some(false));

        let args = ConfigArgs {
            cache: Some(true),
            ..ConfigArgs::default()
        };
        assert_eq!(args.resolve_cache_enabled(), Some(true));
        assert_eq!(ConfigArgs::default().resolve_cache_enabled(), None);
    }
}
