//! Helpers shared by the command-line backends.

use std::path::PathBuf;

use dr_renderer::{
    FailureKind, RegistryError, RenderContent, RenderOutcome, RenderRequest, RendererConfig,
};
use serde_json::Value;

use crate::process::ProcessError;

/// Executable and selection priority of a command-line backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSettings {
    /// Executable name (looked up on `PATH`) or path.
    pub command: String,
    pub priority: i32,
}

impl CommandSettings {
    pub fn new(command: impl Into<String>, priority: i32) -> Self {
        Self {
            command: command.into(),
            priority,
        }
    }

    /// Apply a `command` override from renderer config.
    pub(crate) fn with_overrides(
        &self,
        renderer: &str,
        config: &RendererConfig,
    ) -> Result<Self, RegistryError> {
        let command = match config.get("command") {
            None => self.command.clone(),
            Some(Value::String(command)) => command.clone(),
            Some(other) => {
                return Err(RegistryError::Configuration {
                    renderer: renderer.to_owned(),
                    message: format!("command must be a string, got {other}"),
                });
            }
        };
        if command.trim().is_empty() {
            return Err(RegistryError::Configuration {
                renderer: renderer.to_owned(),
                message: "command must not be empty".to_owned(),
            });
        }
        Ok(Self {
            command,
            priority: self.priority,
        })
    }
}

/// Resolve `command` to an executable path.
pub(crate) fn resolve_program(command: &str) -> Option<PathBuf> {
    which::which(command).ok()
}

/// Failed outcome for a command that could not be resolved.
pub(crate) fn missing_program(renderer: &str, format: &str, command: &str) -> RenderOutcome {
    RenderOutcome::failure(
        renderer,
        format,
        FailureKind::NotAvailable,
        format!("{command} executable not found; install it and ensure it is in your PATH"),
    )
}

/// Failed outcome for a process error.
pub(crate) fn process_failure(renderer: &str, format: &str, err: &ProcessError) -> RenderOutcome {
    RenderOutcome::failure(renderer, format, err.failure_kind(), err.to_string())
}

/// Failed outcome for a format the backend does not produce.
pub(crate) fn unsupported_format(renderer: &str, format: &str) -> RenderOutcome {
    RenderOutcome::failure(
        renderer,
        format,
        FailureKind::UnsupportedFormat,
        format!("format '{format}' is not supported"),
    )
}

/// Successful outcome from converter output, tagged with the command used.
///
/// Each non-empty stderr line becomes a warning.
pub(crate) fn converted(
    renderer: &str,
    request: &RenderRequest<'_>,
    command: &str,
    bytes: Vec<u8>,
    stderr: &[u8],
) -> RenderOutcome {
    let size = bytes.len();
    let mut outcome = RenderOutcome::success(
        renderer,
        request.format,
        RenderContent::from_bytes(request.format, bytes),
    )
    .with_metadata("command", command)
    .with_metadata("bytes", size);

    let stderr = String::from_utf8_lossy(stderr);
    for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
        outcome.push_warning(line);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_command_override() {
        let settings = CommandSettings::new("dot", 20);
        let mut config = RendererConfig::new();
        config.insert("command".to_owned(), json!("/opt/graphviz/bin/dot"));

        let resolved = settings.with_overrides("graphviz", &config).unwrap();
        assert_eq!(resolved.command, "/opt/graphviz/bin/dot");
        assert_eq!(resolved.priority, 20);
    }

    #[test]
    fn test_command_override_rejects_bad_values() {
        let settings = CommandSettings::new("dot", 20);

        let mut config = RendererConfig::new();
        config.insert("command".to_owned(), json!(42));
        assert!(matches!(
            settings.with_overrides("graphviz", &config),
            Err(RegistryError::Configuration { .. })
        ));

        config.insert("command".to_owned(), json!("  "));
        assert!(settings.with_overrides("graphviz", &config).is_err());
    }

    #[test]
    fn test_resolve_missing_program() {
        assert!(resolve_program("dr-definitely-not-installed").is_none());
    }
}
