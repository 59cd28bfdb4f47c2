//! `dr renderers` command implementation.

use clap::Args;
use dr_renderer::{Capability, RendererFilter, RendererInfo, RendererRegistry};
use serde_json::json;

use crate::error::CliError;
use crate::output::Output;
use crate::setup::{ConfigArgs, build_registry};

/// Arguments for the renderers command.
#[derive(Args)]
pub(crate) struct RenderersArgs {
    /// Only backends that can produce this format.
    #[arg(short, long)]
    format: Option<String>,

    /// Only backends with this capability (e.g. `theme-support`).
    #[arg(long)]
    capability: Option<Capability>,

    /// Only backends that are currently available.
    #[arg(long)]
    available: bool,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

impl RenderersArgs {
    /// List matching backends in priority order.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load()?;
        let registry = build_registry(&config)?;

        let mut filter = RendererFilter::new().available_only(self.available);
        if let Some(format) = self.format {
            filter = filter.format(format);
        }
        if let Some(capability) = self.capability {
            filter = filter.capability(capability);
        }

        let rows = describe(&registry, &filter);
        if self.json {
            let value: Vec<_> = rows
                .iter()
                .map(|(info, available)| json!({ "info": info, "available": available }))
                .collect();
            output.line(&serde_json::to_string_pretty(&value)?)?;
            return Ok(());
        }

        if rows.is_empty() {
            output.warning("No matching renderers");
        }
        for (info, available) in &rows {
            output.line(&table_row(info, *available))?;
        }
        Ok(())
    }
}

/// Info and availability of every backend matching `filter`.
fn describe(registry: &RendererRegistry, filter: &RendererFilter) -> Vec<(RendererInfo, bool)> {
    registry
        .list_renderers(filter)
        .into_iter()
        .filter_map(|name| {
            let info = registry.info(&name)?;
            Some((info, registry.is_available(&name)))
        })
        .collect()
}

fn table_row(info: &RendererInfo, available: bool) -> String {
    let formats: Vec<&str> = info.supported_formats.iter().map(String::as_str).collect();
    format!(
        "{:<14} {:>4}  {:<11}  {}",
        info.name,
        info.priority,
        if available { "available" } else { "unavailable" },
        formats.join(",")
    )
}
