//! Render results.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde_json::Value;

use crate::error::FailureKind;

/// Rendered content: text for vector/markup formats, bytes for raster and documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderContent {
    Text(String),
    Binary(Vec<u8>),
}

impl RenderContent {
    /// Raw bytes of the content.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Text content, if this is a text variant.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Encode as a base64 `data:` URI for embedding.
    #[must_use]
    pub fn to_data_uri(&self, format: &str) -> String {
        let mime = mime_type(format);
        let encoded = BASE64_STANDARD.encode(self.as_bytes());
        format!("data:{mime};base64,{encoded}")
    }

    /// Build content of the natural variant for `format`.
    ///
    /// Text formats (`svg`, `txt`, ...) become [`RenderContent::Text`] when the
    /// bytes are valid UTF-8; everything else stays binary.
    #[must_use]
    pub fn from_bytes(format: &str, bytes: Vec<u8>) -> Self {
        if is_text_format(format) {
            match String::from_utf8(bytes) {
                Ok(text) => Self::Text(text),
                Err(e) => Self::Binary(e.into_bytes()),
            }
        } else {
            Self::Binary(bytes)
        }
    }
}

/// Whether `format` is a textual output format.
#[must_use]
pub fn is_text_format(format: &str) -> bool {
    matches!(
        format.to_ascii_lowercase().as_str(),
        "svg" | "txt" | "utxt" | "ascii" | "html" | "xml"
    )
}

fn mime_type(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpeg" | "jpg" => "image/jpeg",
        "pdf" => "application/pdf",
        "html" => "text/html",
        "txt" | "utxt" | "ascii" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Result of one render attempt.
///
/// Constructed through [`RenderOutcome::success`] or [`RenderOutcome::failure`]
/// so that a successful outcome always has non-empty content and no error,
/// and a failed outcome always has an error.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    content: Option<RenderContent>,
    format: String,
    renderer_name: String,
    render_time: Duration,
    error: Option<(FailureKind, String)>,
    warnings: Vec<String>,
    metadata: BTreeMap<String, Value>,
}

impl RenderOutcome {
    /// Successful outcome.
    ///
    /// Empty content is not a success; it is turned into a
    /// [`FailureKind::Rendering`] failure.
    #[must_use]
    pub fn success(
        renderer_name: impl Into<String>,
        format: impl Into<String>,
        content: RenderContent,
    ) -> Self {
        let renderer_name = renderer_name.into();
        let format = format.into();
        if content.is_empty() {
            return Self::failure(
                renderer_name,
                format,
                FailureKind::Rendering,
                "renderer produced empty output",
            );
        }
        Self {
            content: Some(content),
            format,
            renderer_name,
            render_time: Duration::ZERO,
            error: None,
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failure(
        renderer_name: impl Into<String>,
        format: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            content: None,
            format: format.into(),
            renderer_name: renderer_name.into(),
            render_time: Duration::ZERO,
            error: Some((kind, message.into())),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_render_time(mut self, render_time: Duration) -> Self {
        self.render_time = render_time;
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn set_render_time(&mut self, render_time: Duration) {
        self.render_time = render_time;
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn content(&self) -> Option<&RenderContent> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn into_content(self) -> Option<RenderContent> {
        self.content
    }

    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    #[must_use]
    pub fn renderer_name(&self) -> &str {
        &self.renderer_name
    }

    #[must_use]
    pub fn render_time(&self) -> Duration {
        self.render_time
    }

    /// Error message of a failed outcome.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|(_, message)| message.as_str())
    }

    /// Failure category of a failed outcome.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|(kind, _)| *kind)
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_content_and_no_error() {
        let outcome = RenderOutcome::success("a", "svg", RenderContent::Text("<svg/>".into()));

        assert!(outcome.is_success());
        assert_eq!(outcome.error(), None);
        assert_eq!(outcome.content().and_then(RenderContent::as_text), Some("<svg/>"));
    }

    #[test]
    fn test_empty_success_becomes_failure() {
        let outcome = RenderOutcome::success("a", "svg", RenderContent::Text(String::new()));

        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Rendering));
        assert!(outcome.content().is_none());
    }

    #[test]
    fn test_failure_carries_kind_and_message() {
        let outcome = RenderOutcome::failure("a", "png", FailureKind::Timeout, "took too long");

        assert!(!outcome.is_success());
        assert_eq!(outcome.error(), Some("took too long"));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_from_bytes_picks_variant_by_format() {
        assert!(RenderContent::from_bytes("svg", b"<svg/>".to_vec()).is_text());
        assert!(!RenderContent::from_bytes("png", b"\x89PNG".to_vec()).is_text());
        // Invalid UTF-8 in a text format stays binary
        assert!(!RenderContent::from_bytes("svg", vec![0xFF, 0xFE]).is_text());
    }

    #[test]
    fn test_data_uri() {
        let content = RenderContent::Binary(b"abc".to_vec());
        assert_eq!(content.to_data_uri("png"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_metadata_and_warnings() {
        let outcome = RenderOutcome::success("a", "svg", RenderContent::Text("x".into()))
            .with_warning("slow")
            .with_metadata("bytes", 1);

        assert_eq!(outcome.warnings(), ["slow".to_owned()]);
        assert_eq!(outcome.metadata().get("bytes"), Some(&Value::from(1)));
    }
}
