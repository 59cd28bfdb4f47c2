//! Error taxonomy for rendering and registry operations.

use std::fmt;

use serde::Serialize;

/// Category of a single failed render attempt.
///
/// Carried inside a failed [`RenderOutcome`](crate::RenderOutcome) so that
/// ordinary backend failures are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The renderer does not produce the requested format.
    UnsupportedFormat,
    /// The renderer's liveness probe failed.
    NotAvailable,
    /// The renderer's configuration is invalid.
    Configuration,
    /// Generic backend failure (crash, network error, non-zero exit).
    Rendering,
    /// The attempt exceeded its deadline.
    Timeout,
    /// The attempt was cancelled by the caller.
    Cancelled,
}

impl FailureKind {
    /// Whether repeating the same attempt later could succeed.
    ///
    /// A format mismatch or a bad configuration fails the same way every
    /// time; a cancelled request is not to be resumed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::UnsupportedFormat | Self::Configuration | Self::Cancelled
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedFormat => "unsupported format",
            Self::NotAvailable => "not available",
            Self::Configuration => "configuration error",
            Self::Rendering => "rendering error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One failed candidate in a render request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    /// Name of the renderer that was attempted.
    pub renderer: String,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.renderer, self.message)
    }
}

/// Render error surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No registered renderer declares the requested format.
    #[error("unsupported format '{format}': no registered renderer supports it")]
    UnsupportedFormat { format: String },

    /// The request was cancelled by the caller.
    #[error("render cancelled")]
    Cancelled,

    /// Every candidate failed.
    #[error("All renderers failed: {}", format_attempts(.attempts))]
    AllFailed { attempts: Vec<AttemptFailure> },
}

impl RenderError {
    /// Per-attempt failures carried by an aggregate error, if any.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptFailure] {
        match self {
            Self::AllFailed { attempts } => attempts,
            _ => &[],
        }
    }
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Registry operation error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A renderer with this name is already registered.
    #[error("renderer '{0}' is already registered")]
    Duplicate(String),

    /// No renderer with this name is registered.
    #[error("renderer '{0}' is not registered")]
    NotFound(String),

    /// The factory rejected the supplied configuration.
    #[error("renderer '{renderer}' is misconfigured: {message}")]
    Configuration { renderer: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(renderer: &str, message: &str) -> AttemptFailure {
        AttemptFailure {
            renderer: renderer.to_owned(),
            kind: FailureKind::Rendering,
            message: message.to_owned(),
        }
    }

    #[test]
    fn test_all_failed_message_lists_every_attempt() {
        let err = RenderError::AllFailed {
            attempts: vec![failure("A", "boom"), failure("B", "exit code 2")],
        };

        assert_eq!(
            err.to_string(),
            "All renderers failed: A: boom, B: exit code 2"
        );
        assert_eq!(err.attempts().len(), 2);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Rendering.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::NotAvailable.is_retryable());
        assert!(!FailureKind::Configuration.is_retryable());
        assert!(!FailureKind::UnsupportedFormat.is_retryable());
        assert!(!FailureKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_only_aggregate_errors_carry_attempts() {
        let err = RenderError::UnsupportedFormat {
            format: "webp".to_owned(),
        };
        assert!(err.attempts().is_empty());
        assert!(RenderError::Cancelled.attempts().is_empty());
    }
}
