//! Per-attempt deadline and cancellation.
//!
//! Backends receive a [`RenderContext`] with every render call. Blocking
//! backends poll it (or bound their I/O by [`RenderContext::remaining`]) and
//! abort the external work when it reports an interruption.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::FailureKind;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

/// Cooperative cancellation flag shared between a caller and a render attempt.
///
/// A child token created with [`CancelToken::child`] reports cancellation when
/// either it or any ancestor is cancelled; cancelling a child never affects
/// its parent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is also cancelled when `self` is.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(token) = current {
            if token.inner.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            current = token.inner.parent.as_ref();
        }
        false
    }
}

/// Execution context for one render attempt.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl RenderContext {
    /// Context with no deadline and a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Time left before the deadline (`None` when unbounded).
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reason the attempt must stop, if any. Cancellation wins over timeout.
    #[must_use]
    pub fn interruption(&self) -> Option<FailureKind> {
        if self.is_cancelled() {
            Some(FailureKind::Cancelled)
        } else if self.is_expired() {
            Some(FailureKind::Timeout)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_observes_parent_cancellation() {
        let parent = CancelToken::new();
        let child = parent.child();

        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancellation_does_not_propagate_up() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_unbounded_context_never_expires() {
        let ctx = RenderContext::new();

        assert_eq!(ctx.remaining(), None);
        assert!(!ctx.is_expired());
        assert_eq!(ctx.interruption(), None);
    }

    #[test]
    fn test_zero_timeout_is_expired() {
        let ctx = RenderContext::new().with_timeout(Duration::ZERO);

        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert_eq!(ctx.interruption(), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_cancellation_wins_over_timeout() {
        let token = CancelToken::new();
        let ctx = RenderContext::new()
            .with_timeout(Duration::ZERO)
            .with_cancel_token(token.clone());

        token.cancel();
        assert_eq!(ctx.interruption(), Some(FailureKind::Cancelled));
    }
}
