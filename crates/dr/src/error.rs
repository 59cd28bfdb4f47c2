//! CLI error types.

use dr_config::ConfigError;
use dr_renderer::{AttemptFailure, RegistryError, RenderError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),
}

impl CliError {
    /// Per-backend failures behind an aggregate render error.
    pub(crate) fn attempts(&self) -> &[AttemptFailure] {
        match self {
            Self::Render(err) => err.attempts(),
            _ => &[],
        }
    }
}
