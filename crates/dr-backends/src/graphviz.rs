//! Graphviz `dot` backend.
//!
//! Pipes DOT source to `dot -T<format>` and reads the result from stdout.
//!
//! Options: `layout` (engine passed as `-K`, e.g. `neato`), `dpi`.

use std::path::PathBuf;
use std::sync::Arc;

use dr_renderer::{
    Capability, RegistryError, RenderContext, RenderOutcome, RenderRequest, Renderer,
    RendererConfig, RendererFactory, RendererInfo,
};

use crate::command::{
    CommandSettings, converted, missing_program, process_failure, resolve_program,
    unsupported_format,
};
use crate::process::ProcessCommand;

pub const NAME: &str = "graphviz";

const FORMATS: [&str; 3] = ["svg", "png", "pdf"];

/// Settings for the Graphviz backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphvizSettings(pub CommandSettings);

impl Default for GraphvizSettings {
    fn default() -> Self {
        Self(CommandSettings::new("dot", 20))
    }
}

fn info(priority: i32) -> RendererInfo {
    RendererInfo::new(NAME)
        .with_description("Graphviz dot layout engine")
        .with_formats(FORMATS)
        .with_capability(Capability::LocalRendering)
        .with_priority(priority)
        .with_dependency("graphviz (dot)")
}

/// Renders DOT through a local `dot` executable.
#[derive(Debug)]
pub struct GraphvizRenderer {
    info: RendererInfo,
    command: String,
}

impl GraphvizRenderer {
    fn args(request: &RenderRequest<'_>) -> Vec<String> {
        let mut args = vec![format!("-T{}", request.format)];
        if let Some(layout) = request.option_str("layout") {
            args.push(format!("-K{layout}"));
        }
        if let Some(dpi) = request.option_u64("dpi") {
            args.push(format!("-Gdpi={dpi}"));
        }
        args
    }

    fn program(&self) -> Option<PathBuf> {
        resolve_program(&self.command)
    }
}

impl Renderer for GraphvizRenderer {
    fn info(&self) -> &RendererInfo {
        &self.info
    }

    fn render(&self, request: &RenderRequest<'_>, ctx: &RenderContext) -> RenderOutcome {
        if !self.supports_format(request.format) {
            return unsupported_format(NAME, request.format);
        }
        let Some(program) = self.program() else {
            return missing_program(NAME, request.format, &self.command);
        };

        let result = ProcessCommand::new(program)
            .args(Self::args(request))
            .stdin(request.source)
            .run(ctx);

        match result {
            Ok(output) => {
                let mut outcome =
                    converted(NAME, request, &self.command, output.stdout, &output.stderr);
                if request.theme.is_some() {
                    outcome.push_warning("graphviz does not support themes; theme ignored");
                }
                outcome
            }
            Err(e) => process_failure(NAME, request.format, &e),
        }
    }

    fn is_available(&self) -> bool {
        self.program().is_some()
    }
}

/// Factory for [`GraphvizRenderer`].
#[derive(Debug, Clone, Default)]
pub struct GraphvizFactory {
    settings: GraphvizSettings,
}

impl GraphvizFactory {
    pub fn new(settings: GraphvizSettings) -> Self {
        Self { settings }
    }
}

impl RendererFactory for GraphvizFactory {
    fn info(&self) -> RendererInfo {
        info(self.settings.0.priority)
    }

    fn create(&self, config: &RendererConfig) -> Result<Arc<dyn Renderer>, RegistryError> {
        let settings = self.settings.0.with_overrides(NAME, config)?;
        Ok(Arc::new(GraphvizRenderer {
            info: info(settings.priority),
            command: settings.command,
        }))
    }
}
