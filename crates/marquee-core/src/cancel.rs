//! Cooperative cancellation of stale continuations

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Token guarding a deferred continuation.
///
/// Cloning shares the token; cancelling any clone turns every pending
/// `continue_with` into a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// A token cancelled together with this one, but cancellable on its own
    pub fn child(&self) -> CancelToken {
        CancelToken {
            inner: self.inner.child_token(),
        }
    }

    /// Run `f` unless the token was cancelled first.
    ///
    /// Returns `None` when the continuation was suppressed.
    pub async fn continue_with<F, Fut, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_cancelled() {
            return None;
        }
        Some(f().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_continuation_suppressed_after_cancel() {
        let token = CancelToken::new();
        assert_eq!(token.continue_with(|| async { 1 }).await, Some(1));

        token.clone().cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.continue_with(|| async { 2 }).await, None);
    }

    #[test]
    fn test_cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let mut waiter = tokio_test::task::spawn(token.cancelled());
        tokio_test::assert_pending!(waiter.poll());

        token.cancel();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
