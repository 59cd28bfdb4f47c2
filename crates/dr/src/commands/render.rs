//! `dr render` command implementation.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use dr_manager::RenderParams;
use dr_renderer::RenderOptions;
use serde_json::Value;

use crate::error::CliError;
use crate::output::Output;
use crate::setup::{ConfigArgs, build_manager};

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Diagram source file, or `-` for stdin.
    input: PathBuf,

    /// Output format (default: output file extension, then config).
    #[arg(short, long)]
    format: Option<String>,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Theme name (overrides config).
    #[arg(long)]
    theme: Option<String>,

    /// Backend to try first.
    #[arg(short, long)]
    renderer: Option<String>,

    /// Do not fall back to other backends after a failure.
    #[arg(long)]
    no_fallback: bool,

    /// Diagram language for backends that serve several (e.g. `plantuml`).
    #[arg(long)]
    diagram_type: Option<String>,

    /// Render option as `key=value`; values are parsed as JSON when possible.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Write a base64 `data:` URI instead of raw content.
    #[arg(long)]
    data_uri: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the input cannot be read, or
    /// every backend fails.
    pub(crate) fn execute(self, verbose: bool) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load()?;

        let source = read_source(&self.input)?;
        let format = self
            .format
            .as_deref()
            .or_else(|| self.output.as_deref().and_then(extension_format))
            .unwrap_or(config.render.default_format.as_str())
            .to_owned();

        let mut options = parse_options(&self.options)?;
        if let Some(diagram_type) = &self.diagram_type {
            options.insert("diagram_type".to_owned(), Value::from(diagram_type.as_str()));
        }

        let mut params = RenderParams::new(source, format)
            .fallback(config.render.fallback && !self.no_fallback)
            .options(options);
        if let Some(theme) = self.theme.as_ref().or(config.render.theme.as_ref()) {
            params = params.theme(theme.clone());
        }
        if let Some(renderer) = self.renderer {
            params = params.preferred_renderer(renderer);
        }

        let manager = build_manager(&config)?;
        let outcome = manager.render(&params)?;

        for warning in outcome.warnings() {
            output.warning(&format!("Warning: {warning}"));
        }
        if verbose {
            output.info(&format!(
                "Rendered {} with {} in {}ms",
                outcome.format(),
                outcome.renderer_name(),
                outcome.render_time().as_millis()
            ));
        }

        let Some(content) = outcome.content() else {
            return Err(CliError::Validation("renderer returned no content".to_owned()));
        };
        let bytes = if self.data_uri {
            content.to_data_uri(outcome.format()).into_bytes()
        } else {
            content.as_bytes().to_vec()
        };

        match &self.output {
            Some(path) => {
                std::fs::write(path, &bytes)?;
                output.success(&format!("Wrote {}", path.display()));
            }
            None => output.bytes(&bytes)?,
        }
        Ok(())
    }
}

fn read_source(input: &Path) -> Result<String, CliError> {
    if input == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

/// Format implied by an output file name (`out.SVG` -> `svg`).
fn extension_format(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Parse `key=value` pairs into render options.
fn parse_options(pairs: &[String]) -> Result<RenderOptions, CliError> {
    let mut options = RenderOptions::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Validation(format!(
                "invalid option '{pair}', expected KEY=VALUE"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Validation(format!(
                "invalid option '{pair}', key is empty"
            )));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
        options.insert(key.to_owned(), value);
    }
    Ok(options)
}
