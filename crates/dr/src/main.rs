//! dr CLI - Diagram rendering.
//!
//! Provides commands for:
//! - `render`: Render a diagram with the best available backend
//! - `formats`: List output formats the registered backends can produce
//! - `renderers`: List registered backends
//! - `cache`: Inspect and maintain the render cache

mod commands;
mod error;
mod output;
mod setup;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CacheCommand, FormatsArgs, RenderArgs, RenderersArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// dr - Diagram rendering with backend fallback and caching.
#[derive(Parser)]
#[command(name = "dr", version, about)]
struct Cli {
    /// Enable verbose output (backend selection and timing logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a diagram.
    Render(RenderArgs),
    /// List output formats of available backends.
    Formats(FormatsArgs),
    /// List registered backends.
    Renderers(RenderersArgs),
    /// Render cache maintenance.
    #[command(subcommand)]
    Cache(CacheCommand),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // RUST_LOG applies unless --verbose asks for info
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(cli.verbose),
        Commands::Formats(args) => args.execute(),
        Commands::Renderers(args) => args.execute(),
        Commands::Cache(cmd) => cmd.execute(),
    };

    if let Err(err) = result {
        let attempts = err.attempts();
        if attempts.is_empty() {
            output.error(&format!("Error: {err}"));
        } else {
            output.error(&format!("Error: all {} renderers failed", attempts.len()));
            output.attempts(attempts);
        }
        std::process::exit(1);
    }
}
