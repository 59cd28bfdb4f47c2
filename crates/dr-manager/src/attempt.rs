//! Running one render attempt under a timeout.
//!
//! The backend call runs on a dedicated worker thread while the calling
//! thread waits on a channel. When the deadline passes or the caller cancels,
//! the attempt's token is cancelled so the backend can tear down its external
//! work (kill the subprocess, drop the connection), and the caller moves on
//! without waiting for the worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use dr_renderer::{FailureKind, RenderContext, RenderOutcome, Renderer};

use crate::params::AttemptJob;

/// How often the waiting thread re-checks for caller cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `renderer` on `job` and wait for its outcome, bounded by `ctx`.
pub(crate) fn run_attempt(
    renderer: Arc<dyn Renderer>,
    job: AttemptJob,
    ctx: &RenderContext,
) -> RenderOutcome {
    let name = renderer.info().name.clone();
    let format = job.format.clone();
    let (tx, rx) = mpsc::channel();
    let worker_ctx = ctx.clone();

    let spawned = thread::Builder::new()
        .name(format!("dr-render-{name}"))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                renderer.render(&job.request(), &worker_ctx)
            }));
            // Release the instance before reporting so a finished attempt
            // never holds up cleanup.
            drop(renderer);
            // The receiver is gone if the attempt already timed out
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return RenderOutcome::failure(
            name,
            format,
            FailureKind::Rendering,
            format!("failed to spawn render worker: {e}"),
        );
    }

    loop {
        let wait = ctx
            .remaining()
            .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));

        match rx.recv_timeout(wait) {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(payload)) => {
                return RenderOutcome::failure(
                    name,
                    format,
                    FailureKind::Rendering,
                    format!("renderer panicked: {}", panic_message(payload.as_ref())),
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                return RenderOutcome::failure(
                    name,
                    format,
                    FailureKind::Rendering,
                    "render worker exited without a result",
                );
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(kind) = ctx.interruption() {
                    ctx.cancel_token().cancel();
                    let message = match kind {
                        FailureKind::Timeout => "timed out".to_owned(),
                        _ => "cancelled".to_owned(),
                    };
                    return RenderOutcome::failure(name, format, kind, message);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_renderer::{CancelToken, MockRenderer, RenderContent, RenderOptions, RendererConfig};

    fn job() -> AttemptJob {
        AttemptJob {
            source: "graph".to_owned(),
            format: "svg".to_owned(),
            theme: None,
            config: RendererConfig::new(),
            options: RenderOptions::new(),
        }
    }

    #[test]
    fn test_successful_attempt() {
        let mock = MockRenderer::new("ok", 1, &["svg"]).succeeding("<svg/>");
        let outcome = run_attempt(Arc::new(mock.clone()), job(), &RenderContext::new());

        assert!(outcome.is_success());
        assert_eq!(
            outcome.content(),
            Some(&RenderContent::Text("<svg/>".to_owned()))
        );
        assert_eq!(mock.render_calls(), 1);
    }

    #[test]
    fn test_timeout_cancels_attempt() {
        let mock = MockRenderer::new("slow", 1, &["svg"]).slow(Duration::from_secs(5), "<svg/>");
        let ctx = RenderContext::new().with_timeout(Duration::from_millis(50));

        let outcome = run_attempt(Arc::new(mock.clone()), job(), &ctx);

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
        assert!(ctx.cancel_token().is_cancelled());

        // The worker notices the cancelled token and stops
        for _ in 0..100 {
            if mock.interrupted_calls() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(mock.interrupted_calls(), 1);
    }

    #[test]
    fn test_caller_cancellation() {
        let mock = MockRenderer::new("slow", 1, &["svg"]).slow(Duration::from_secs(5), "<svg/>");
        let caller = CancelToken::new();
        let ctx = RenderContext::new().with_cancel_token(caller.child());

        let canceller = caller.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let outcome = run_attempt(Arc::new(mock), job(), &ctx);
        handle.join().unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
    }

    #[test]
    fn test_panic_is_recorded_as_failure() {
        let mock = MockRenderer::new("boom", 1, &["svg"]).panicking();
        let outcome = run_attempt(Arc::new(mock), job(), &RenderContext::new());

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Rendering));
        assert!(outcome.error().unwrap().contains("panicked"));
        assert!(outcome.error().unwrap().contains("boom"));
    }
}
