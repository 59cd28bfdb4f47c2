//! `dr formats` command implementation.

use clap::Args;

use crate::error::CliError;
use crate::output::Output;
use crate::setup::{ConfigArgs, build_manager};

/// Arguments for the formats command.
#[derive(Args)]
pub(crate) struct FormatsArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

impl FormatsArgs {
    /// Print one format per line, sorted.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load()?;
        let manager = build_manager(&config)?;

        let formats = manager.available_formats();
        if formats.is_empty() {
            output.warning("No rendering backend is available");
        }
        for format in formats {
            output.line(&format)?;
        }
        Ok(())
    }
}
