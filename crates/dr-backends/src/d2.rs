//! D2 backend.
//!
//! Source goes in on stdin; the output is written to a scratch file so every
//! format (not just SVG) can be produced.
//!
//! Themes: `dark` maps to D2 theme 200, `default`/`light` to 0, and numeric
//! theme ids pass through. Options: `layout`, `sketch`, `pad`.

use std::fs;
use std::sync::Arc;

use dr_renderer::{
    Capability, FailureKind, RegistryError, RenderContext, RenderOutcome, RenderRequest, Renderer,
    RendererConfig, RendererFactory, RendererInfo,
};
use serde_json::Value;

use crate::command::{
    CommandSettings, converted, missing_program, process_failure, resolve_program,
    unsupported_format,
};
use crate::process::ProcessCommand;
use crate::scratch::ScratchDir;

pub const NAME: &str = "d2";

const FORMATS: [&str; 3] = ["svg", "png", "pdf"];

const DARK_THEME_ID: &str = "200";
const LIGHT_THEME_ID: &str = "0";

/// Settings for the D2 backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D2Settings(pub CommandSettings);

impl Default for D2Settings {
    fn default() -> Self {
        Self(CommandSettings::new("d2", 20))
    }
}

fn info(priority: i32) -> RendererInfo {
    RendererInfo::new(NAME)
        .with_description("D2 declarative diagrams")
        .with_formats(FORMATS)
        .with_capability(Capability::LocalRendering)
        .with_capability(Capability::ThemeSupport)
        .with_priority(priority)
        .with_dependency("d2")
}

/// Map a theme name to a D2 theme id.
fn theme_id(theme: &str) -> Option<&str> {
    match theme {
        "dark" => Some(DARK_THEME_ID),
        "default" | "light" => Some(LIGHT_THEME_ID),
        id if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => Some(id),
        _ => None,
    }
}

/// Renders D2 through a local `d2` executable.
#[derive(Debug)]
pub struct D2Renderer {
    info: RendererInfo,
    command: String,
    scratch: ScratchDir,
}

impl D2Renderer {
    /// Arguments before the `- <output>` pair, plus warnings for ignored input.
    fn args(request: &RenderRequest<'_>) -> (Vec<String>, Vec<String>) {
        let mut args = Vec::new();
        let mut warnings = Vec::new();

        if let Some(theme) = request.theme {
            match theme_id(theme) {
                Some(id) => args.push(format!("--theme={id}")),
                None => warnings.push(format!("unknown d2 theme '{theme}'; using default")),
            }
        }
        if let Some(layout) = request.option_str("layout") {
            args.push(format!("--layout={layout}"));
        }
        if let Some(pad) = request.option_u64("pad") {
            args.push(format!("--pad={pad}"));
        }
        if request.options.get("sketch").and_then(Value::as_bool) == Some(true) {
            args.push("--sketch".to_owned());
        }
        (args, warnings)
    }
}

impl Renderer for D2Renderer {
    fn info(&self) -> &RendererInfo {
        &self.info
    }

    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome {
        if !self.supports_format(request.format) {
            return unsupported_format(NAME, request.format);
        }
        let Some(program) = resolve_program(&self.command) else {
            return missing_program(NAME, request.format, &self.command);
        };

        let files = match self.scratch.reserve("d2", request.format) {
            Ok(files) => files,
            Err(e) => {
                return RenderOutcome::failure(
                    NAME,
                    request.format,
                    FailureKind::Rendering,
                    format!("failed to create scratch directory: {e}"),
                );
            }
        };

        let (args, warnings) = Self::args(request);
        let result = ProcessCommand::new(program)
            .args(args)
            .arg("-")
            .arg(&files.output)
            .stdin(request.source)
            .run(ctx);

        let outcome = match result {
            Ok(output) => match fs::read(&files.output) {
                Ok(bytes) => {
                    let mut outcome =
                        converted(NAME, request, &self.command, bytes, &output.stderr);
                    for warning in warnings {
                        outcome.push_warning(warning);
                    }
                    outcome
                }
                Err(e) => RenderOutcome::failure(
                    NAME,
                    request.format,
                    FailureKind::Rendering,
                    format!("d2 produced no output file: {e}"),
                ),
            },
            Err(e) => process_failure(NAME, request.format, &e),
        };
        files.remove();
        outcome
    }

    fn is_available(&self) -> bool {
        resolve_program(&self.command).is_some()
    }

    fn cleanup(&self) {
        self.scratch.release();
    }
}

/// Factory for [`D2Renderer`].
#[derive(Debug, Clone, Default)]
pub struct D2Factory {
    settings: D2Settings,
}

impl D2Factory {
    pub fn new(settings: D2Settings) -> Self {
        Self { settings }
    }
}

impl RendererFactory for D2Factory {
    fn info(&self) -> RendererInfo {
        info(self.settings.0.priority)
    }

    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        let settings = self.settings.0.with_overrides(NAME, config)?;
        Ok(Arc::new(D2Renderer {
            info: info(settings.priority),
            command: settings.command,
            scratch: ScratchDir::new("dr-d2-"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use dr_renderer::{RenderContent, RenderOptions};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_theme_ids() {
        assert_eq!(theme_id("dark"), Some("200"));
        assert_eq!(theme_id("default"), Some("0"));
        assert_eq!(theme_id("105"), Some("105"));
        assert_eq!(theme_id("forest"), None);
        assert_eq!(theme_id(""), None);
    }

    #[test]
    fn test_args_and_warnings() {
        let config = RendererConfig::new();
        let mut options = RenderOptions::new();
        options.insert("layout".to_owned(), json!("elk"));
        options.insert("sketch".to_owned(), json!(true));
        let request = RenderRequest {
            source: "a -> b",
            format: "svg",
            theme: Some("forest"),
            config: &config,
            options: &options,
        };

        let (args, warnings) = D2Renderer::args(&request);
        assert_eq!(args, vec!["--layout=elk", "--sketch"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("forest"));
    }

    #[cfg(unix)]
    #[test]
    fn test_render_with_fake_d2() {
        let dir = tempfile::TempDir::new().unwrap();
        // Writes stdin to the last argument
        let d2 = crate::testing::fake_executable(
            &dir,
            "d2",
            r#"for last; do :; done; cat > "$last""#,
        );
        let mut config = RendererConfig::new();
        config.insert("command".to_owned(), json!(d2.to_str().unwrap()));
        let renderer = D2Factory::default().create(&config).unwrap();

        let options = RenderOptions::new();
        let request = RenderRequest {
            source: "a -> b",
            format: "svg",
            theme: Some("dark"),
            config: &config,
            options: &options,
        };
        let outcome = renderer.render(&request, &RenderContext::new());
        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(
            outcome.content(),
            Some(&RenderContent::Text("a -> b".to_owned()))
        );
        renderer.cleanup();
    }
}
