//! `dr cache` subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use dr_cache::CacheStats;
use dr_manager::PreloadConfig;

use crate::error::CliError;
use crate::output::Output;
use crate::setup::{ConfigArgs, build_manager};

/// Cache maintenance commands.
#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Show cache statistics.
    Stats(StatsArgs),
    /// Delete every cache entry.
    Clear(MaintenanceArgs),
    /// Delete expired cache entries.
    Cleanup(MaintenanceArgs),
    /// Render a batch of diagrams into the cache.
    Preload(PreloadArgs),
}

#[derive(Args)]
pub(crate) struct StatsArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
pub(crate) struct MaintenanceArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
pub(crate) struct PreloadArgs {
    /// JSON file holding an array of `{source, format, theme, options}` objects.
    file: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

impl CacheCommand {
    /// Execute the cache subcommand.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        match self {
            Self::Stats(args) => {
                let manager = build_manager(&args.config.load()?)?;
                let stats = manager.cache_stats();
                if args.json {
                    output.line(&serde_json::to_string_pretty(&stats)?)?;
                } else {
                    for line in stats_lines(&stats) {
                        output.line(&line)?;
                    }
                }
            }
            Self::Clear(args) => {
                let manager = build_manager(&args.config.load()?)?;
                let removed = manager.clear_cache();
                output.success(&format!("Removed {removed} cache entries"));
            }
            Self::Cleanup(args) => {
                let manager = build_manager(&args.config.load()?)?;
                let removed = manager.cleanup_expired_cache();
                output.success(&format!("Removed {removed} expired cache entries"));
            }
            Self::Preload(args) => {
                let configs = read_preload_configs(&args.file)?;
                let manager = build_manager(&args.config.load()?)?;
                output.highlight(&format!("Preloading {} diagrams", configs.len()));

                let summary = manager.preload_cache(&configs);
                if summary.failed > 0 {
                    output.warning(&format!(
                        "{} rendered, {} failed",
                        summary.successful, summary.failed
                    ));
                } else {
                    output.success(&format!("{} rendered", summary.successful));
                }
            }
        }
        Ok(())
    }
}

fn read_preload_configs(path: &std::path::Path) -> Result<Vec<PreloadConfig>, CliError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn stats_lines(stats: &CacheStats) -> Vec<String> {
    vec![
        format!("entries:   {}", stats.total_files),
        format!("size:      {} bytes", stats.total_size_bytes),
        format!("hits:      {}", stats.cache_hits),
        format!("misses:    {}", stats.cache_misses),
        format!("hit rate:  {:.1}%", stats.hit_rate * 100.0),
    ]
}
