//! Cooperative cancellation shared by callers, handlers and Runtime calls.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation signal.
///
/// All clones observe the same state. Once cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns once
        // the value flips to `true`.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_completes_after_cancel_from_another_task() {
        // Arrange
        let token = CancellationToken::new();
        let remote = token.clone();

        // Act
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            remote.cancel();
        });
        let waited = tokio::time::timeout(Duration::from_secs(1), token.cancelled()).await;

        // Assert
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_completes_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;

        assert!(waited.is_ok());
    }
}
