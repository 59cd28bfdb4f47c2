//! Configuration management for dr.
//!
//! Parses `dr.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `cache.dir`
//! - `kroki.url`
//! - `mermaid_cli.command`, `mermaid_cli.puppeteer_config`
//! - `graphviz.command`
//! - `d2.command`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override Kroki URL.
    pub kroki_url: Option<String>,
    /// Override per-attempt render timeout.
    pub timeout_seconds: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "dr.toml";

/// Project data directory, relative to the config file.
const PROJECT_DIR: &str = ".dr";

/// Upper bound on the per-attempt timeout.
const MAX_TIMEOUT_SECONDS: u64 = 600;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,
    /// Render policy.
    pub render: RenderConfig,
    /// Kroki backend (optional section). When present, `url` is required.
    kroki: Option<KrokiConfigRaw>,
    /// Mermaid CLI backend.
    pub mermaid_cli: MermaidCliConfig,
    /// Graphviz backend.
    pub graphviz: GraphvizConfig,
    /// D2 backend.
    pub d2: D2Config,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Resolved Kroki configuration (set after loading).
    #[serde(skip)]
    pub kroki_resolved: KrokiConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
    ttl_seconds: Option<u64>,
}

/// Resolved cache configuration with an absolute directory.
#[derive(Debug)]
pub struct CacheConfig {
    /// Whether rendered diagrams are cached.
    pub enabled: bool,
    /// Cache directory.
    pub dir: PathBuf,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
}

impl CacheConfig {
    /// Default entry lifetime (24 hours).
    pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            enabled: true,
            dir: base.join(PROJECT_DIR).join("cache"),
            ttl_seconds: Self::DEFAULT_TTL_SECONDS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Render policy.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_seconds: u64,
    /// Try the next renderer after a failure.
    pub fallback: bool,
    /// Format used when none is requested.
    pub default_format: String,
    /// Theme used when none is requested.
    pub theme: Option<String>,
}

impl RenderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            fallback: true,
            default_format: "svg".to_owned(),
            theme: None,
        }
    }
}

/// Raw Kroki configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct KrokiConfigRaw {
    url: Option<String>,
    priority: Option<i32>,
}

/// Resolved Kroki configuration.
#[derive(Debug)]
pub struct KrokiConfig {
    /// Kroki server URL. Kroki is unavailable without one.
    pub url: Option<String>,
    pub priority: i32,
}

impl KrokiConfig {
    pub const DEFAULT_PRIORITY: i32 = 30;
}

impl Default for KrokiConfig {
    fn default() -> Self {
        Self {
            url: None,
            priority: Self::DEFAULT_PRIORITY,
        }
    }
}

/// Mermaid CLI (`mmdc`) configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MermaidCliConfig {
    pub command: String,
    pub priority: i32,
    /// Puppeteer config file, resolved against the config directory.
    pub puppeteer_config: Option<PathBuf>,
}

impl Default for MermaidCliConfig {
    fn default() -> Self {
        Self {
            command: "mmdc".to_owned(),
            priority: 10,
            puppeteer_config: None,
        }
    }
}

/// Graphviz (`dot`) configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphvizConfig {
    pub command: String,
    pub priority: i32,
}

impl Default for GraphvizConfig {
    fn default() -> Self {
        Self {
            command: "dot".to_owned(),
            priority: 20,
        }
    }
}

/// D2 configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct D2Config {
    pub command: String,
    pub priority: i32,
}

impl Default for D2Config {
    fn default() -> Self {
        Self {
            command: "d2".to_owned(),
            priority: 20,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`kroki.url`").
        field: String,
        /// Error message (e.g., "${`KROKI_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `dr.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated again afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or a value is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
        if let Some(kroki_url) = &settings.kroki_url {
            self.kroki_resolved.url = Some(kroki_url.clone());
        }
        if let Some(timeout_seconds) = settings.timeout_seconds {
            self.render.timeout_seconds = timeout_seconds;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            cache: CacheConfigRaw::default(),
            render: RenderConfig::default(),
            kroki: None,
            mermaid_cli: MermaidCliConfig::default(),
            graphviz: GraphvizConfig::default(),
            d2: D2Config::default(),
            cache_resolved: CacheConfig::default_with_base(base),
            kroki_resolved: KrokiConfig::default(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_cache()?;
        self.validate_render()?;
        self.validate_backends()?;
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        if self.cache_resolved.ttl_seconds == 0 {
            return Err(ConfigError::Validation(
                "cache.ttl_seconds must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_render(&self) -> Result<(), ConfigError> {
        let timeout = self.render.timeout_seconds;
        if timeout == 0 {
            return Err(ConfigError::Validation(
                "render.timeout_seconds must be greater than 0".to_owned(),
            ));
        }
        if timeout > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::Validation(format!(
                "render.timeout_seconds cannot exceed {MAX_TIMEOUT_SECONDS}"
            )));
        }
        require_non_empty(&self.render.default_format, "render.default_format")?;
        Ok(())
    }

    fn validate_backends(&self) -> Result<(), ConfigError> {
        // Only validate the URL if set (Kroki enabled)
        if let Some(ref url) = self.kroki_resolved.url {
            require_non_empty(url, "kroki.url")?;
            require_http_url(url, "kroki.url")?;
        }
        require_non_empty(&self.mermaid_cli.command, "mermaid_cli.command")?;
        require_non_empty(&self.graphviz.command, "graphviz.command")?;
        require_non_empty(&self.d2.command, "d2.command")?;
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.cache.dir, "cache.dir")?;

        if let Some(ref mut kroki) = self.kroki {
            expand::expand_opt(&mut kroki.url, "kroki.url")?;
        }

        self.mermaid_cli.command =
            expand::expand_env(&self.mermaid_cli.command, "mermaid_cli.command")?;
        if let Some(path) = &self.mermaid_cli.puppeteer_config {
            let expanded =
                expand::expand_env(&path.to_string_lossy(), "mermaid_cli.puppeteer_config")?;
            self.mermaid_cli.puppeteer_config = Some(PathBuf::from(expanded));
        }
        self.graphviz.command = expand::expand_env(&self.graphviz.command, "graphviz.command")?;
        self.d2.command = expand::expand_env(&self.d2.command, "d2.command")?;

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    ///
    /// Validates that `url` is provided when a `[kroki]` section exists.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let default_cache = CacheConfig::default_with_base(config_dir);
        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(true),
            dir: self
                .cache
                .dir
                .as_deref()
                .map_or(default_cache.dir, |dir| config_dir.join(dir)),
            ttl_seconds: self
                .cache
                .ttl_seconds
                .unwrap_or(CacheConfig::DEFAULT_TTL_SECONDS),
        };

        self.kroki_resolved = match &self.kroki {
            Some(kroki) => {
                let url = kroki.url.clone().ok_or_else(|| {
                    ConfigError::Validation("[kroki] section requires url to be set".to_owned())
                })?;
                KrokiConfig {
                    url: Some(url),
                    priority: kroki.priority.unwrap_or(KrokiConfig::DEFAULT_PRIORITY),
                }
            }
            None => KrokiConfig::default(),
        };

        if let Some(path) = &self.mermaid_cli.puppeteer_config {
            self.mermaid_cli.puppeteer_config = Some(config_dir.join(path));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, PathBuf::from("/test/.dr/cache"));
        assert_eq!(config.cache_resolved.ttl(), Duration::from_secs(86400));
        assert_eq!(config.render.timeout(), Duration::from_secs(30));
        assert!(config.render.fallback);
        assert_eq!(config.render.default_format, "svg");
        assert!(config.kroki_resolved.url.is_none());
        assert_eq!(config.mermaid_cli.command, "mmdc");
        assert_eq!(config.graphviz.command, "dot");
        assert_eq!(config.d2.command, "d2");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.render.timeout_seconds, 30);
        assert_eq!(config.mermaid_cli.priority, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[cache]
enabled = false
dir = "tmp/cache"
ttl_seconds = 3600

[render]
timeout_seconds = 10
fallback = false
default_format = "png"
theme = "dark"

[kroki]
url = "https://kroki.io"
priority = 5

[mermaid_cli]
command = "/usr/local/bin/mmdc"
puppeteer_config = "puppeteer.json"

[graphviz]
priority = 40

[d2]
command = "d2-nightly"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project")).unwrap();
        config.validate().unwrap();

        assert!(!config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, PathBuf::from("/project/tmp/cache"));
        assert_eq!(config.cache_resolved.ttl_seconds, 3600);
        assert_eq!(config.render.timeout_seconds, 10);
        assert!(!config.render.fallback);
        assert_eq!(config.render.default_format, "png");
        assert_eq!(config.render.theme.as_deref(), Some("dark"));
        assert_eq!(config.kroki_resolved.url.as_deref(), Some("https://kroki.io"));
        assert_eq!(config.kroki_resolved.priority, 5);
        assert_eq!(config.mermaid_cli.command, "/usr/local/bin/mmdc");
        assert_eq!(
            config.mermaid_cli.puppeteer_config,
            Some(PathBuf::from("/project/puppeteer.json"))
        );
        assert_eq!(config.graphviz.priority, 40);
        assert_eq!(config.graphviz.command, "dot");
        assert_eq!(config.d2.command, "d2-nightly");
    }

    #[test]
    fn test_kroki_section_requires_url() {
        let toml = r"
[kroki]
priority = 5
";
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.resolve_paths(Path::new("/project")).unwrap_err();

        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("[render]\ntimeout_seconds = 0", "timeout_seconds"),
            ("[render]\ntimeout_seconds = 601", "cannot exceed"),
            ("[cache]\nttl_seconds = 0", "ttl_seconds"),
            ("[kroki]\nurl = \"kroki.io\"", "http"),
            ("[graphviz]\ncommand = \"\"", "graphviz.command"),
        ];
        for (toml, expected) in cases {
            let mut config: Config = toml::from_str(toml).unwrap();
            config.resolve_paths(Path::new("/project")).unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{toml}: expected '{expected}' in '{err}'"
            );
        }
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            cache_enabled: Some(false),
            kroki_url: Some("http://localhost:8000".to_owned()),
            timeout_seconds: Some(5),
        };

        config.apply_cli_settings(&overrides);

        assert!(!config.cache_resolved.enabled);
        assert_eq!(
            config.kroki_resolved.url.as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(config.render.timeout_seconds, 5);
        assert_eq!(config.graphviz.command, "dot"); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_empty_keeps_values() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings::default());

        assert!(config.cache_resolved.enabled);
        assert!(config.kroki_resolved.url.is_none());
        assert_eq!(config.render.timeout_seconds, 30);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");
        std::fs::write(
            &path,
            "[kroki]\nurl = \"${DR_TEST_UNSET_KROKI:-https://kroki.example.com}\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(
            config.kroki_resolved.url.as_deref(),
            Some("https://kroki.example.com")
        );
        assert_eq!(config.cache_resolved.dir, dir.path().join(".dr/cache"));
    }

    #[test]
    fn test_load_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/dr.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_revalidates_cli_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");
        std::fs::write(&path, "").unwrap();

        let overrides = CliSettings {
            kroki_url: Some("not-a-url".to_owned()),
            ..Default::default()
        };
        let err = Config::load(Some(&path), Some(&overrides)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dr.toml");
        std::fs::write(&path, "[render\ntimeout_seconds = ").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
