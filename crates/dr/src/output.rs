//! Colored terminal output.
//!
//! Status goes to stderr; stdout carries only command data (rendered
//! diagrams, listings, JSON) so it can be piped.

use std::io::Write;

use console::{Style, Term};
use dr_renderer::AttemptFailure;

pub(crate) struct Output {
    status: Term,
    data: Term,
    ok: Style,
    warn: Style,
    err: Style,
    dim: Style,
    heading: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            status: Term::stderr(),
            data: Term::stdout(),
            ok: Style::new().green(),
            warn: Style::new().yellow(),
            err: Style::new().red(),
            dim: Style::new().dim(),
            heading: Style::new().cyan().bold(),
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        self.status_line(&self.dim, msg);
    }

    pub(crate) fn success(&self, msg: &str) {
        self.status_line(&self.ok, msg);
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.status_line(&self.warn, msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.status_line(&self.err, msg);
    }

    pub(crate) fn highlight(&self, msg: &str) {
        self.status_line(&self.heading, msg);
    }

    /// One indented line per failed backend, in attempt order.
    pub(crate) fn attempts(&self, attempts: &[AttemptFailure]) {
        for attempt in attempts {
            self.status_line(
                &self.err,
                &format!("  {} ({}): {}", attempt.renderer, attempt.kind, attempt.message),
            );
        }
    }

    /// Write one line of command data to stdout.
    pub(crate) fn line(&self, msg: &str) -> std::io::Result<()> {
        self.data.write_line(msg)
    }

    /// Write raw content to stdout.
    pub(crate) fn bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut data = &self.data;
        data.write_all(bytes)?;
        data.flush()
    }

    // Terminal write failures (closed stderr) are not worth failing a command over.
    fn status_line(&self, style: &Style, msg: &str) {
        let _ = self.status.write_line(&style.apply_to(msg).to_string());
    }
}
