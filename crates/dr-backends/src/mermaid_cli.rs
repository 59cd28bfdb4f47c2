//! Mermaid CLI (`mmdc`) backend.
//!
//! `mmdc` reads and writes files, so each instance owns a scratch directory
//! that [`Renderer::cleanup`] removes.
//!
//! Options: `background`, `width`, `height`, `scale`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
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

pub const NAME: &str = "mermaid-cli";

const FORMATS: [&str; 3] = ["svg", "png", "pdf"];

/// Settings for the Mermaid CLI backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MermaidCliSettings {
    pub command: CommandSettings,
    /// Puppeteer configuration file passed with `-p`.
    pub puppeteer_config: Option<PathBuf>,
}

impl Default for MermaidCliSettings {
    fn default() -> Self {
        Self {
            command: CommandSettings::new("mmdc", 10),
            puppeteer_config: None,
        }
    }
}

fn info(priority: i32) -> RendererInfo {
    RendererInfo::new(NAME)
        .with_description("Mermaid diagrams through the mermaid-cli (mmdc) tool")
        .with_formats(FORMATS)
        .with_capability(Capability::LocalRendering)
        .with_capability(Capability::ThemeSupport)
        .with_priority(priority)
        .with_dependency("@mermaid-js/mermaid-cli (mmdc)")
}

/// Renders Mermaid through a local `mmdc` executable.
#[derive(Debug)]
pub struct MermaidCliRenderer {
    info: RendererInfo,
    command: String,
    puppeteer_config: Option<PathBuf>,
    scratch: ScratchDir,
}

impl MermaidCliRenderer {
    fn args(
        &self,
        request: &RenderRequest<'_>,
        input: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--quiet".into(),
            "-i".into(),
            input.into(),
            "-o".into(),
            output.into(),
        ];
        if let Some(theme) = request.theme {
            args.extend(["-t".into(), theme.into()]);
        }
        if let Some(background) = request.option_str("background") {
            args.extend(["-b".into(), background.into()]);
        }
        for (key, flag) in [("width", "-w"), ("height", "-H"), ("scale", "-s")] {
            if let Some(value) = request.options.get(key).and_then(number_arg) {
                args.extend([flag.into(), value.into()]);
            }
        }
        if let Some(config) = &self.puppeteer_config {
            args.extend(["-p".into(), config.into()]);
        }
        args
    }
}

/// Numeric option rendered as a command-line argument.
fn number_arg(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.parse::<f64>().is_ok() => Some(s.clone()),
        _ => None,
    }
}

impl Renderer for MermaidCliRenderer {
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

        let files = match self.scratch.reserve("mmd", request.format) {
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
        if let Err(e) = fs::write(&files.input, request.source) {
            files.remove();
            return RenderOutcome::failure(
                NAME,
                request.format,
                FailureKind::Rendering,
                format!("failed to write diagram source: {e}"),
            );
        }

        let result = ProcessCommand::new(program)
            .args(self.args(request, &files.input, &files.output))
            .run(ctx);

        let outcome = match result {
            Ok(output) => match fs::read(&files.output) {
                Ok(bytes) => converted(NAME, request, &self.command, bytes, &output.stderr),
                Err(e) => RenderOutcome::failure(
                    NAME,
                    request.format,
                    FailureKind::Rendering,
                    format!("mmdc produced no output file: {e}"),
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

/// Factory for [`MermaidCliRenderer`].
#[derive(Debug, Clone, Default)]
pub struct MermaidCliFactory {
    settings: MermaidCliSettings,
}

impl MermaidCliFactory {
    pub fn new(settings: MermaidCliSettings) -> Self {
        Self { settings }
    }
}

impl RendererFactory for MermaidCliFactory {
    fn info(&self) -> RendererInfo {
        info(self.settings.command.priority)
    }

    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        let command = self.settings.command.with_overrides(NAME, config)?;
        let puppeteer_config = match config.get("puppeteer_config") {
            None => self.settings.puppeteer_config.clone(),
            Some(Value::String(path)) => Some(PathBuf::from(path)),
            Some(other) => {
                return Err(RegistryError::Configuration {
                    renderer: NAME.to_owned(),
                    message: format!("puppeteer_config must be a path, got {other}"),
                });
            }
        };

        Ok(Arc::new(MermaidCliRenderer {
            info: info(command.priority),
            command: command.command,
            puppeteer_config,
            scratch: ScratchDir::new("dr-mmdc-"),
        }))
    }
}
